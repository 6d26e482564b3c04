pub mod queries;
pub mod routes;

pub use queries::{
    LookupPhoneError, LookupPhoneQuery, LookupPhoneResponse, TableCountsError, TableCountsQuery,
    TableCountsResponse,
};

pub use routes::lookup_routes;
