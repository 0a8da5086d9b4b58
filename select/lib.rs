#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod allcount;
pub mod annotate;
pub mod best;
pub mod dispatch;
pub mod grain;
pub mod pipeline;
pub mod registry;
#[path = "../shared/files.rs"]
pub mod shared_files;
pub mod types;
pub mod vcf;
pub mod shared {
    pub use super::shared_files as files;
}
