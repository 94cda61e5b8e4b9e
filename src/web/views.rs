//! Inline HTML for the handful of pages the broker serves.

use std::fmt::Write as _;

use axum::response::Html;

use crate::auth::services::ServiceInfo;
use crate::auth::session::{Flash, FlashLevel, SessionUser};
use crate::models::token::StoredToken;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, user: Option<&SessionUser>, flashes: &[Flash], body: &str) -> Html<String> {
    let mut page = String::new();
    let _ = write!(
        page,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{} - idiotic.io</title></head>\n<body>\n<nav><a href=\"/\">idiotic.io</a> ",
        escape(title)
    );
    match user {
        Some(u) => {
            let _ = write!(page, "| {} | <a href=\"/logout\">Log out</a>", escape(&u.name));
        }
        None => page.push_str("| <a href=\"/login\">Log in</a> | <a href=\"/register\">Register</a>"),
    }
    page.push_str("</nav>\n");
    for f in flashes {
        let class = match f.level {
            FlashLevel::Info => "info",
            FlashLevel::Error => "error",
        };
        let _ = writeln!(page, "<p class=\"flash {}\">{}</p>", class, escape(&f.message));
    }
    page.push_str(body);
    page.push_str("\n</body>\n</html>\n");
    Html(page)
}

pub fn login_page(flashes: &[Flash], email: &str, next: Option<&str>) -> Html<String> {
    let action = match next {
        Some(n) => format!("/login?next={}", urlencoding::encode(n)),
        None => "/login".to_string(),
    };
    let body = format!(
        r#"<h1>Log in</h1>
<form method="post" action="{}">
<label>Email <input type="email" name="email" value="{}"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">Log in</button>
</form>"#,
        escape(&action),
        escape(email)
    );
    layout("Log in", None, flashes, &body)
}

pub fn register_page(flashes: &[Flash], name: &str, email: &str) -> Html<String> {
    let body = format!(
        r#"<h1>Register</h1>
<form method="post" action="/register">
<label>Name <input type="text" name="name" value="{}"></label>
<label>Email <input type="email" name="email" value="{}"></label>
<label>Password <input type="password" name="password1"></label>
<label>Confirm password <input type="password" name="password2"></label>
<button type="submit">Create account</button>
</form>"#,
        escape(name),
        escape(email)
    );
    layout("Register", None, flashes, &body)
}

pub fn dashboard(
    user: Option<&SessionUser>,
    flashes: &[Flash],
    services: &[ServiceInfo],
    tokens: &[StoredToken],
) -> Html<String> {
    let mut body = String::from("<h1>Services</h1>\n<ul class=\"services\">\n");
    for svc in services {
        let linked = tokens.iter().any(|t| t.token.service == svc.name);
        let _ = write!(body, "<li>{}", escape(&svc.name));
        if let Some(desc) = &svc.description {
            let _ = write!(body, " - {}", escape(desc));
        }
        if user.is_some() && svc.available {
            let label = if linked { "Re-authorize" } else { "Authorize" };
            let _ = write!(
                body,
                " <a href=\"/authorize/{}\">{}</a>",
                urlencoding::encode(&svc.name),
                label
            );
        } else if !svc.available {
            body.push_str(" (unavailable)");
        }
        body.push_str("</li>\n");
    }
    body.push_str("</ul>\n");

    if user.is_some() {
        body.push_str("<h2>Your tokens</h2>\n");
        if tokens.is_empty() {
            body.push_str("<p>No services authorized yet.</p>\n");
        } else {
            body.push_str("<table class=\"tokens\">\n<tr><th>Service</th><th>Type</th><th>Scopes</th><th>Expires</th></tr>\n");
            for t in tokens {
                let scopes = t.scope_names().collect::<Vec<_>>().join(" ");
                let _ = writeln!(
                    body,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape(&t.token.service),
                    escape(&t.token.token_type),
                    escape(&scopes),
                    escape(&t.token.expiration)
                );
            }
            body.push_str("</table>\n");
        }
    }
    layout("Dashboard", user, flashes, &body)
}
