//! Data models for Contratos

mod attachment;
mod company;
mod contract;
mod employee;
mod service_order;
mod sync_conflict;
mod unit;
mod user;

pub use attachment::{attachment_file_name, Attachment, AttachmentKind, NewAttachment};
pub use company::{Company, NewCompany};
pub use contract::Contract;
pub use employee::{Employee, NewEmployee};
pub use service_order::{
    service_order_code, ServiceOrder, ServiceOrderDetails, ServiceOrderStatus,
    SERVICE_ORDER_PREFIX,
};
pub use sync_conflict::SyncConflict;
pub use unit::Unit;
pub use user::{NewUser, User, UserRole};

/// Parse the trailing `_NNN` counter of a generated name, ignoring any extension.
pub(crate) fn trailing_sequence(name: &str) -> Option<u32> {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    stem.rsplit_once('_')?.1.parse().ok()
}
