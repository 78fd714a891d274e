mod history;
mod item;
mod user;

pub use history::*;
pub use item::*;
pub use user::*;
