mod messages;
mod types;

pub use messages::{ActionResponse, RejectRequest, StatusResponse, StatusUpdateEvent};
pub use types::{InvalidInvoiceId, InvoiceId, InvoiceStatus};
