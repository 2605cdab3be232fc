mod data_type;
mod schema;
mod tuple;
mod value;

pub use data_type::DataType;
pub use schema::TableSchema;
pub use tuple::{Tuple, TupleBuilder};
pub use value::Value;
