pub mod chrome_driver;
pub mod driver;
pub mod locator;

pub use chrome_driver::ChromeDriver;
pub use driver::{DownloadedFile, ElementAction, ElementRef, PageDriver, PendingDownload};
pub use locator::{FrameHop, FramePath, Locator};
