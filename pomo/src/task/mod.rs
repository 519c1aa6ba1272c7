// Task tree model and the utilities that filter, sort and walk it

pub mod duration;
pub mod filter;
pub mod functional;
pub mod model;
pub mod sort;

pub use filter::Filter;
pub use model::{Pomodoro, PomodoroState, Task, TaskId, ROOT_ID};
pub use sort::{SortKey, SortOrder, SortSpec};
