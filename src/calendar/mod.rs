pub mod event;
pub mod calendar_type;
pub mod category;
pub mod patch;
pub mod user;
pub mod validation;

pub use event::{CalendarEventCount, Event, EventPatch, EventStats, NewEvent};
pub use calendar_type::{
    AccessLevel, Calendar, CalendarMembership, CalendarPatch, MemberInput, NewCalendar,
    UnknownAccessLevel,
};
pub use category::{Category, CategoryPatch, NewCategory};
pub use user::{NewUser, User, UserPatch, UserRole};
pub use validation::ValidationKind;
