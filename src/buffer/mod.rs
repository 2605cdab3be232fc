mod buffer_pool;
mod lru_replacer;

pub use buffer_pool::*;
pub use lru_replacer::*;
