pub mod entry;
pub mod manager;
pub mod tempfile;

pub use entry::{ListId, QueryEntry, QueryError, QueryId, QueryMode, XaslId};
pub use manager::{QueryExecInfo, QueryManager};
pub use tempfile::{MembufType, PageLocation, TempFileDescriptor, TempFileFreeLists, TempFileRing};
