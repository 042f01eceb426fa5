// Metadata headers
pub const METADATA: &str = "@metadata";
pub const METADATA_ETAG: &str = "@etag";
pub const METADATA_ID: &str = "@id";
pub const LAST_MODIFIED: &str = "Last-Modified";
pub const ENTITY_NAME: &str = "Raven-Entity-Name";
pub const TYPE_TAG: &str = "Raven-Rust-Type";
pub const READ_ONLY: &str = "Raven-Read-Only";
pub const READ_VETO: &str = "Raven-Read-Veto";
pub const READ_VETO_TRIGGER: &str = "Trigger";
pub const READ_VETO_REASON: &str = "Reason";
pub const DOCUMENT_DOES_NOT_EXIST: &str = "Raven-Document-Does-Not-Exists";
pub const CREATE_VERSION: &str = "Raven-Create-Version";
pub const NON_AUTHORITATIVE_INFORMATION: &str = "Non-Authoritative-Information";

/// Headers that are only meaningful on the client and never sent with a write.
pub const LOCAL_ONLY_HEADERS: [&str; 3] = [METADATA_ETAG, METADATA_ID, METADATA];

// Batch methods
pub const METHOD_PUT: &str = "PUT";
pub const METHOD_DELETE: &str = "DELETE";

// Conventions
pub const DEFAULT_IDENTITY_PROPERTY: &str = "id";
pub const KEY_PREFIX_SEPARATOR: char = '/';
pub const DEFAULT_MAX_REQUESTS_PER_SESSION: u32 = 30;
pub const DOCKET_VERSION: &str = env!("CARGO_PKG_VERSION");
