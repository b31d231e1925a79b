use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Page size used when a listing request does not ask for one.
    pub default_page_size: u32,
    /// Larger requested page sizes are clamped to this.
    pub max_page_size: u32,
    pub min_project_points: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            default_page_size: 10,
            max_page_size: 200,
            min_project_points: 100,
        }
    }
}
