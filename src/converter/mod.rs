//! 转换器规则定义与存储

pub mod store;
pub mod types;

pub use store::{ConverterStore, FileConverterStore, MemoryConverterStore, seed_defaults};
pub use types::{Converter, DEFAULT_CONVERTERS, ModifyMode, ModifyType};
