mod client;
mod multistatus;

pub use client::{
    ApiErrorClass, ContentStream, Credentials, DavClient, DavError, DavResource, Depth,
    ResourceKind,
};
