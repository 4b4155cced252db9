//! Live ballot engine: presents consultas of candidates, enforces one vote
//! per device, derives the vote value (null vote when several candidates are
//! marked), reports it to a remote tally service and keeps live aggregate
//! results flowing back.

pub mod ballot;
pub mod catalog;
pub mod handlers;
pub mod models;
pub mod store;
pub mod tally;
pub mod tasks;
pub mod voting;

pub use ballot::{Ballot, BallotState, Notice, Selection};
pub use catalog::{Catalog, CatalogError};
pub use handlers::App;
pub use models::{Candidate, Consulta, TallyFeed, TallySnapshot, VoteRecord, NULL_VOTE_LABEL};
pub use store::{DeviceIdentityStore, FileSlot, IdentitySlot, SqliteSlot};
pub use tally::{HttpTallyClient, SubmissionChannel, TallyService};
pub use voting::{aggregate, AggregateView, GroupTally};
