pub mod borrower;
pub mod commands;
pub mod errors;
pub mod events;
pub mod item;
pub mod loan;
pub mod search;
pub mod value_objects;

pub use borrower::*;
pub use errors::*;
pub use events::*;
pub use item::*;
pub use loan::*;
pub use value_objects::*;
