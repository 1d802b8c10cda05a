pub mod sheets_client;

pub use sheets_client::SheetsClient;
