//! Dooray API groups.

mod calendar;
mod messenger;
mod projects;
mod wiki;

pub use calendar::{CalendarApi, CreateEventRequest, EventQuery};
pub use messenger::{CreateChannelRequest, MemberQuery, MessengerApi};
pub use projects::{CreatePostRequest, PostFilter, PostUsers, Priority, ProjectsApi, UpdatePostRequest};
pub use wiki::{CreateWikiPageRequest, UpdateWikiPageRequest, WikiApi};
