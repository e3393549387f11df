pub mod get;
pub mod kinds;
pub mod list;
pub mod util;
