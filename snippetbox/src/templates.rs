//! HTML rendering
//!
//! Pages are minijinja templates compiled into the binary. Every page extends
//! `base.html` and receives one [`TemplateData`] value.

use crate::error::AppResult;
use crate::models::{Snippet, User};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;
use thiserror::Error;

/// Rendering errors
#[derive(Debug, Error)]
pub enum RenderError {
    /// No page registered under this name
    #[error("the template {0} does not exist")]
    UnknownPage(String),

    /// Template execution failed
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// Data handed to every page
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateData {
    /// Year shown in the footer
    pub current_year: i32,
    /// One-shot message, empty when there is none
    pub flash: String,
    /// Whether the request is authenticated
    pub is_authenticated: bool,
    /// Masked CSRF token for forms
    pub csrf_token: String,
    /// Form being displayed, with input and errors
    pub form: Option<Value>,
    /// Snippet shown on the view page
    pub snippet: Option<Snippet>,
    /// Snippets listed on the home page
    pub snippets: Vec<Snippet>,
    /// Account shown on the account page
    pub user: Option<User>,
}

impl TemplateData {
    /// Attach a form
    #[must_use]
    pub fn with_form<F: Serialize>(mut self, form: &F) -> Self {
        self.form = Some(Value::from_serialize(form));
        self
    }
}

/// Render collaborator
pub trait Renderer: Send + Sync + 'static {
    /// Render `page` to HTML
    ///
    /// # Errors
    ///
    /// Returns an error for unknown pages or failing templates.
    fn render(&self, page: &str, data: &TemplateData) -> Result<String, RenderError>;
}

const PAGES: [(&str, &str); 7] = [
    ("home.html", include_str!("../templates/pages/home.html")),
    ("view.html", include_str!("../templates/pages/view.html")),
    ("create.html", include_str!("../templates/pages/create.html")),
    ("signup.html", include_str!("../templates/pages/signup.html")),
    ("login.html", include_str!("../templates/pages/login.html")),
    ("account.html", include_str!("../templates/pages/account.html")),
    ("password.html", include_str!("../templates/pages/password.html")),
];

/// Embedded template set
#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Compile all templates
    ///
    /// # Errors
    ///
    /// Returns an error if a template does not parse.
    pub fn new() -> Result<Self, RenderError> {
        let mut env = Environment::new();
        // pages are shared between GET (no form yet) and failed POSTs
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.add_filter("human_date", human_date);
        env.add_template("base.html", include_str!("../templates/base.html"))?;
        env.add_template("partials/nav.html", include_str!("../templates/partials/nav.html"))?;
        for (name, source) in PAGES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }
}

impl Renderer for Templates {
    fn render(&self, page: &str, data: &TemplateData) -> Result<String, RenderError> {
        if !PAGES.iter().any(|(name, _)| *name == page) {
            return Err(RenderError::UnknownPage(page.to_string()));
        }
        let template = self.env.get_template(page)?;
        Ok(template.render(data)?)
    }
}

/// Format a timestamp like `02 Jan 2006 at 15:04`, in UTC
///
/// Values that are not RFC 3339 timestamps render as an empty string.
#[must_use]
pub fn human_date(value: &str) -> String {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc).format("%d %b %Y at %H:%M").to_string())
        .unwrap_or_default()
}

/// Render `page` and answer with `status`
///
/// The page is rendered completely before the status is chosen, so a failing
/// template never leaves a half-written response behind.
///
/// # Errors
///
/// Returns [`crate::error::AppError::Render`] if rendering fails.
pub fn render(
    renderer: &dyn Renderer,
    status: StatusCode,
    page: &str,
    data: &TemplateData,
) -> AppResult<Response> {
    let body = renderer.render(page, data)?;
    Ok((status, Html(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::SnippetCreateForm;
    use chrono::TimeZone;

    fn data() -> TemplateData {
        TemplateData {
            current_year: 2026,
            csrf_token: "tok".into(),
            ..TemplateData::default()
        }
    }

    #[test]
    fn test_human_date() {
        let t = Utc.with_ymd_and_hms(2024, 3, 17, 10, 15, 0).unwrap();
        assert_eq!(human_date(&t.to_rfc3339()), "17 Mar 2024 at 10:15");
        assert_eq!(human_date("not a date"), "");
    }

    #[test]
    fn test_all_pages_compile() {
        let templates = Templates::new().unwrap();
        for (page, _) in PAGES {
            let data = match page {
                "view.html" => TemplateData {
                    snippet: Some(Snippet {
                        id: 1,
                        title: "t".into(),
                        content: "c".into(),
                        created: Utc::now(),
                        expires: Utc::now(),
                    }),
                    ..data()
                },
                "account.html" => TemplateData {
                    user: Some(User {
                        id: 1,
                        name: "Alice".into(),
                        email: "alice@example.com".into(),
                        created: Utc::now(),
                    }),
                    ..data()
                },
                _ => data(),
            };
            let html = templates.render(page, &data).unwrap();
            assert!(html.contains("2026"), "{page} did not render the footer");
        }
    }

    #[test]
    fn test_unknown_page() {
        let templates = Templates::new().unwrap();
        assert!(matches!(
            templates.render("missing.html", &data()),
            Err(RenderError::UnknownPage(_))
        ));
        assert!(matches!(
            templates.render("base.html", &data()),
            Err(RenderError::UnknownPage(_))
        ));
    }

    #[test]
    fn test_form_errors_and_csrf_are_rendered() {
        let templates = Templates::new().unwrap();
        let mut form = SnippetCreateForm {
            title: "<b>hi</b>".into(),
            expires: 30,
            ..SnippetCreateForm::default()
        };
        form.validate();

        let html = templates
            .render("create.html", &data().with_form(&form))
            .unwrap();
        assert!(html.contains("This field must equal 1, 7 or 365"));
        assert!(html.contains(r#"name="csrf_token" value="tok""#));
        // autoescaped
        assert!(html.contains("&lt;b&gt;hi"));
        assert!(!html.contains("<b>hi"));
    }

    #[test]
    fn test_flash_is_shown() {
        let templates = Templates::new().unwrap();
        let html = templates
            .render(
                "home.html",
                &TemplateData {
                    flash: "Snippet created successfully!".into(),
                    ..data()
                },
            )
            .unwrap();
        assert!(html.contains("Snippet created successfully!"));
    }
}
