pub mod event;
pub mod registration;
pub mod user;

pub use event::{Event, EventCategory, EventDocument, EventFilter, EventPage, NewEvent, PageCursor};
pub use registration::{
    PaymentMethod, Registration, RegistrationStatus, RegistrationUpsert,
};
pub use user::User;
