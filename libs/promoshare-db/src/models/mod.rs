pub mod job;
pub mod offer;
pub mod task;
pub mod template;
pub mod user;

pub use job::{JobKind, ScheduledJob};
pub use offer::Offer;
pub use task::{Task, TaskKind, TaskStatus};
pub use template::{MemeTemplate, TextTemplate};
pub use user::User;
