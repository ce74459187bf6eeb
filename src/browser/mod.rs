pub mod chromium;
pub mod connection;
pub mod driver;
pub mod headless;

pub use chromium::{ChromiumSession, ChromiumSessionFactory, PageMarkers};
pub use driver::{
    bounded, settle_within, AnomalyReport, BrowserSession, DriverOutcome, Extractor,
    PageMetrics, SessionFactory,
};
