use dropvault_core::{Credentials, DavClient};
use sqlx::SqlitePool;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::index::IndexStore;

pub(crate) const ROOT: &str = "/dav/alice/";

pub(crate) enum Node<'a> {
    Folder(&'a str),
    File {
        href: &'a str,
        content_type: &'a str,
        length: u64,
    },
}

impl Node<'_> {
    fn response(&self) -> String {
        match self {
            Node::Folder(href) => format!(
                "<D:response><D:href>{href}</D:href><D:propstat><D:prop>\
                 <D:resourcetype><D:collection/></D:resourcetype>\
                 </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>"
            ),
            Node::File {
                href,
                content_type,
                length,
            } => format!(
                "<D:response><D:href>{href}</D:href><D:propstat><D:prop>\
                 <D:resourcetype/><D:getcontenttype>{content_type}</D:getcontenttype>\
                 <D:getcontentlength>{length}</D:getcontentlength>\
                 </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>"
            ),
        }
    }
}

fn multistatus(responses: String) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><D:multistatus xmlns:D="DAV:">{responses}</D:multistatus>"#
    )
}

pub(crate) async fn make_store() -> IndexStore {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = IndexStore::from_pool(pool);
    store.init().await.unwrap();
    store
}

pub(crate) fn client_for(server: &MockServer) -> DavClient {
    DavClient::new(
        &format!("{}{ROOT}", server.uri()),
        Credentials::new("alice", "secret"),
    )
    .unwrap()
}

/// Answers the depth-0 lookup of the root collection.
pub(crate) async fn mount_root(server: &MockServer) {
    Mock::given(method("PROPFIND"))
        .and(path(ROOT))
        .and(header("depth", "0"))
        .respond_with(
            ResponseTemplate::new(207).set_body_string(multistatus(Node::Folder(ROOT).response())),
        )
        .mount(server)
        .await;
}

/// Answers the depth-1 listing of `folder` with `children`.
pub(crate) async fn mount_listing(server: &MockServer, folder: &str, children: &[Node<'_>]) {
    let responses: String = std::iter::once(Node::Folder(folder).response())
        .chain(children.iter().map(Node::response))
        .collect();
    Mock::given(method("PROPFIND"))
        .and(path(folder))
        .and(header("depth", "1"))
        .respond_with(ResponseTemplate::new(207).set_body_string(multistatus(responses)))
        .mount(server)
        .await;
}

pub(crate) async fn mount_content(server: &MockServer, href: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(href))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

pub(crate) fn file<'a>(href: &'a str, content_type: &'a str, length: u64) -> Node<'a> {
    Node::File {
        href,
        content_type,
        length,
    }
}
