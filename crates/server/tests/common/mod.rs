//! Common test utilities and fixtures.

pub mod fixtures;
pub mod ledger;
pub mod scanner;
pub mod server;
pub mod store;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use ledger::*;
#[allow(unused_imports)]
pub use scanner::*;
#[allow(unused_imports)]
pub use server::*;
#[allow(unused_imports)]
pub use store::*;
