mod benchmark;
mod index;
mod search;
pub mod server;

pub use benchmark::*;
pub use index::*;
pub use search::*;
pub use server::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
