pub mod lookup_phone;
pub mod table_counts;

pub use lookup_phone::{LookupPhoneError, LookupPhoneQuery, LookupPhoneResponse};
pub use table_counts::{TableCountsError, TableCountsQuery, TableCountsResponse};
