//! XRay 链接检测、修改与重新生成

pub mod detect;
pub mod error;
pub mod link;
pub mod modify;
pub mod types;
pub mod yaml;

pub use detect::detect;
pub use error::XrayError;
pub use modify::modify;
pub use types::{DetectedConfig, ModifiedConfig, Protocol, RawConfig};
