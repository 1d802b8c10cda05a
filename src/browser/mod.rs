pub mod chrome_renderer;
pub mod cookies;
pub mod headless;

pub use chrome_renderer::{ChromeRenderer, ChromeRendererFactory, ChromeSettings};
pub use cookies::{load_cookies, StoredCookie};
pub use headless::launch_headless_browser;
