use quick_xml::Reader;
use quick_xml::events::Event;

use crate::client::DavError;

/// One `<response>` of a `207 Multi-Status` body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DavEntry {
    pub href: String,
    pub display_name: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub is_collection: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Href,
    DisplayName,
    ContentType,
    ContentLength,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"href" => Some(Field::Href),
            b"displayname" => Some(Field::DisplayName),
            b"getcontenttype" => Some(Field::ContentType),
            b"getcontentlength" => Some(Field::ContentLength),
            _ => None,
        }
    }

    fn assign(self, entry: &mut DavEntry, value: &str) -> Result<(), DavError> {
        let non_empty = (!value.is_empty()).then(|| value.to_string());
        match self {
            Field::Href => entry.href = value.to_string(),
            Field::DisplayName => entry.display_name = non_empty,
            Field::ContentType => entry.content_type = non_empty,
            Field::ContentLength => {
                entry.content_length = match non_empty {
                    Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                        DavError::Xml(format!("invalid getcontentlength: {raw}"))
                    })?),
                    None => None,
                }
            }
        }
        Ok(())
    }
}

// Elements are matched by local name so any namespace prefix works.
pub(crate) fn parse(body: &str) -> Result<Vec<DavEntry>, DavError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<DavEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Eof => break,
            Event::Start(element) => match element.local_name().as_ref() {
                b"response" => current = Some(DavEntry::default()),
                b"collection" => {
                    if let Some(entry) = current.as_mut() {
                        entry.is_collection = true;
                    }
                }
                name => {
                    if let Some(active) = Field::from_local_name(name) {
                        field = Some(active);
                        text.clear();
                    }
                }
            },
            Event::Empty(element) => {
                if element.local_name().as_ref() == b"collection"
                    && let Some(entry) = current.as_mut()
                {
                    entry.is_collection = true;
                }
            }
            Event::Text(content) => {
                if field.is_some() {
                    text.push_str(&content.unescape().map_err(xml_error)?);
                }
            }
            Event::End(element) => {
                let name = element.local_name();
                if name.as_ref() == b"response" {
                    if let Some(entry) = current.take() {
                        if entry.href.is_empty() {
                            return Err(DavError::Xml("response without href".into()));
                        }
                        entries.push(entry);
                    }
                } else if let Some(active) = field
                    && Field::from_local_name(name.as_ref()) == Some(active)
                {
                    if let Some(entry) = current.as_mut() {
                        active.assign(entry, text.trim())?;
                    }
                    field = None;
                }
            }
            _ => {}
        }
    }

    Ok(entries)
}

fn xml_error(err: impl std::fmt::Display) -> DavError {
    DavError::Xml(err.to_string())
}
