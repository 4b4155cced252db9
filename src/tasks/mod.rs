pub mod tally_poller;
