// Service exports
pub mod api;
pub mod credentials;
pub mod gateway;

pub use api::{ApiClient, ApiError};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError};
pub use gateway::{ApiResponse, Gateway, GatewayError, RequestBody, RequestSpec};
