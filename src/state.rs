use crate::blob::BlobStore;
use crate::identity::IdentityProvider;
use crate::vault::Vault;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub vault: Vault,
    pub identity: Arc<dyn IdentityProvider>,
    pub blobs: Arc<dyn BlobStore>,
}

pub type SharedState = Arc<AppState>;
