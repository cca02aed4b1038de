pub mod weather;
pub mod web_search;

pub use weather::OpenWeatherClient;
pub use web_search::TavilySearch;
