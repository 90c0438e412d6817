pub mod machine;
pub mod machine_name;

pub use machine::{FilterMap, Machine};
pub use machine_name::MachineName;
