//! Infrastructure layer: configuration, persistence, the command pipeline
//! and the small process-wide services (cache, currency, SQL proxy).

pub mod activity;
pub mod agency;
pub mod cache;
pub mod command_dispatcher;
pub mod config;
pub mod currency;
pub mod remote_query;
pub mod schema;
pub mod sql_proxy;
pub mod store;
pub mod users;

pub use activity::{ActivityEntry, ActivityLog, InMemoryActivityLog, PostgresActivityLog};
pub use agency::{Agency, AgencyDirectory, AgencyError, AgencyUpdate, AgencyUsage, NewAgency, Plan};
pub use cache::TtlCache;
pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched, Snapshot};
pub use config::Config;
pub use currency::{CurrencyError, CurrencyService};
pub use remote_query::{RemoteQueryClient, RemoteQueryError};
pub use sql_proxy::{QueryError, QueryRequest, QueryResponse, SqlProxy};
pub use store::{Collection, InMemoryRecordStore, PostgresRecordStore, RecordStore, StoreError};
pub use users::{hash_backup_code, NewUser, TwoFactorState, UserDirectory, UserProfile};
