//! URL builders for every backend route the client touches

/// Endpoint table rooted at the API base URL
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn at(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    // Auth

    pub fn login(&self) -> String {
        self.at("/token")
    }

    pub fn register(&self) -> String {
        self.at("/signup")
    }

    pub fn me(&self) -> String {
        self.at("/me")
    }

    // Clients

    pub fn client(&self) -> String {
        self.at("/client")
    }

    // Queues

    pub fn queues(&self) -> String {
        self.at("/queue")
    }

    pub fn queue(&self, id: i64) -> String {
        self.at(&format!("/queue/{}", id))
    }

    pub fn reservables(&self, date: &str, service_id: i64) -> String {
        self.at(&format!(
            "/queue/reservables/list?date={}&service_id={}",
            date, service_id
        ))
    }

    pub fn waitlist(&self) -> String {
        self.at("/waitlist")
    }

    pub fn call(&self, queue_id: i64) -> String {
        self.at(&format!("/call/{}", queue_id))
    }

    pub fn finish(&self, queue_id: i64) -> String {
        self.at(&format!("/finish/{}", queue_id))
    }

    // Services

    pub fn services(&self) -> String {
        self.at("/service")
    }

    pub fn service(&self, id: i64) -> String {
        self.at(&format!("/service/{}", id))
    }

    // Reports and uploads

    pub fn report_queues(&self, year: i32) -> String {
        self.at(&format!("/report/queues/{}", year))
    }

    pub fn avatars(&self) -> String {
        self.at("/avatars")
    }

    /// Resolve a server-relative image path against the base URL
    pub fn image_url(&self, path: &str) -> Option<String> {
        if path.is_empty() {
            return None;
        }
        if path.starts_with("http://") || path.starts_with("https://") {
            return Some(path.to_string());
        }
        Some(format!("{}/{}", self.base, path.trim_start_matches('/')))
    }
}
