use stelshop_browser::BrowserSession;

/// XPath expressions that only match once the operator is logged in
const LOGGED_IN_MARKERS: &[&str] = &[
    "//a[@id='ui-id-2']",
    "//div[@class='header-usuario']",
    "//button[contains(@class, 'logout')]",
];

const MARKER_SCRIPT: &str = r#"
const markers = arguments[0];
return markers.some((xpath) =>
    document.evaluate(xpath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null)
        .singleNodeValue !== null);
"#;

/// Detects whether the Stelorder web app shows an authenticated page
pub struct LoginGate {
    markers: Vec<String>,
}

impl Default for LoginGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginGate {
    pub fn new() -> Self {
        Self {
            markers: LOGGED_IN_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn with_markers(markers: Vec<String>) -> Self {
        Self { markers }
    }

    /// Check the current page once. Read-only; waiting for the operator to log
    /// in is the caller's business.
    ///
    /// Script errors read as "not logged in"; only a lost session is an error.
    pub async fn check_logged_in<S>(&self, session: &mut S) -> stelshop_browser::Result<bool>
    where
        S: BrowserSession + ?Sized,
    {
        let args = [serde_json::json!(self.markers)];
        match session.execute_script(MARKER_SCRIPT, &args).await {
            Ok(value) => {
                let logged_in = value.as_bool().unwrap_or(false);
                tracing::debug!("Login check: {}", logged_in);
                Ok(logged_in)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::debug!("Login check failed: {}", e);
                Ok(false)
            }
        }
    }
}
