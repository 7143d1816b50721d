pub mod doctor;
pub mod ingest;
pub mod onboard;
pub mod serve;
