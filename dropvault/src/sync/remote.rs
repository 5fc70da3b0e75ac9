use std::future::Future;

use dropvault_core::{ContentStream, DavClient, DavError, DavResource};

/// One authenticated session against the remote tree.
pub trait RemoteTree {
    fn base_identifier(&self) -> impl Future<Output = Result<String, DavError>> + Send;

    fn root_resource(&self) -> impl Future<Output = Result<DavResource, DavError>> + Send;

    /// Immediate children of `parent` only, in server order.
    fn list_children(
        &self,
        parent: &DavResource,
    ) -> impl Future<Output = Result<Vec<DavResource>, DavError>> + Send;

    fn fetch(
        &self,
        resource: &DavResource,
    ) -> impl Future<Output = Result<ContentStream, DavError>> + Send;
}

impl RemoteTree for DavClient {
    async fn base_identifier(&self) -> Result<String, DavError> {
        Ok(DavClient::base_identifier(self).to_string())
    }

    async fn root_resource(&self) -> Result<DavResource, DavError> {
        DavClient::root_resource(self).await
    }

    async fn list_children(&self, parent: &DavResource) -> Result<Vec<DavResource>, DavError> {
        DavClient::list_children(self, parent).await
    }

    async fn fetch(&self, resource: &DavResource) -> Result<ContentStream, DavError> {
        self.get(resource).await
    }
}
