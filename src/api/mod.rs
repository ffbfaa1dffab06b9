mod batch;
pub(crate) mod errors;
mod handlers;
pub(crate) mod router;
mod setup;
mod submissions;
mod uploads;
pub(crate) mod validation;
