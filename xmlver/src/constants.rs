//! Constants shared by the edit-script codec and the revision store.

/// Namespace of the versioning vocabulary.
pub const VERSIONING_NS: &str = "http://exist-db.org/versioning";

/// Prefix bound to [`VERSIONING_NS`] in written documents.
pub const VERSIONING_PREFIX: &str = "v";

/// Root element of a persisted revision.
pub const VERSION_TAG: &str = "version";
/// Properties block inside the version root.
pub const PROPERTIES_TAG: &str = "properties";
/// Whole-document deletion marker, also used for removed nodes when annotating.
pub const REMOVED_TAG: &str = "removed";
/// Inserted-content marker used when annotating.
pub const INSERTED_TAG: &str = "inserted";
/// Body of a revision that replaced the document with a binary copy.
pub const REPLACED_BINARY_TAG: &str = "replaced-binary";
/// Body of a revision that replaced a binary resource with an XML copy.
pub const REPLACED_XML_TAG: &str = "replaced-xml";

/// Property names inside the properties block.
pub const PROP_DOCUMENT: &str = "document";
pub const PROP_REVISION: &str = "revision";
pub const PROP_DATE: &str = "date";
pub const PROP_USER: &str = "user";
pub const PROP_KEY: &str = "key";

/// Versioning attributes placed on the root element of served documents.
pub const ATTR_VERSION_REVISION: &str = "revision";
pub const ATTR_VERSION_KEY: &str = "key";
pub const ATTR_VERSION_PATH: &str = "path";

/// Suffixes of the stored copies next to a document's edit scripts.
pub const BASE_SUFFIX: &str = ".base";
pub const TEMP_SUFFIX: &str = ".tmp";
pub const DELETED_SUFFIX: &str = ".deleted";
pub const BINARY_SUFFIX: &str = ".binary";
pub const XML_SUFFIX: &str = ".xml";

/// File holding the persisted revision counter.
pub const REVISION_COUNTER_FILE: &str = "versions.dbx";

/// Trigger parameter controlling whether concurrent overwrites are allowed.
pub const PARAM_OVERWRITE: &str = "overwrite";

/// Default number of siblings searched ahead for a content match.
pub const DEFAULT_LOOKAHEAD: usize = 8;
