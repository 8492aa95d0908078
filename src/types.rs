use std::sync::{Arc, RwLock};

use crate::error::CoreError;

// Type alias, not a new type: cannot define inherent methods on it.
pub type Pod<T> = Arc<RwLock<T>>;

pub type ResultPod<T> = Result<Pod<T>, CoreError>;
pub type CoreResult<T> = Result<T, CoreError>;
pub type SmallResult = Result<(), CoreError>;
