//! Login form and success page rendering
//!
//! Small enough that a template engine would be overkill; plain `format!`
//! with HTML-escaped interpolations.

/// Minimal HTML escape for attribute and text positions
fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// The credential form
///
/// `state` and `redirect_uri` ride along as hidden fields so a failed
/// attempt can retry without restarting the authorization flow.
pub fn login_form(state: &str, redirect_uri: &str, error: Option<&str>) -> String {
    let error_block = match error {
        Some(message) => format!(r#"<p class="error">{}</p>"#, escape(message)),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign in to Craftboard</title></head>
<body>
  <h1>Sign in to Craftboard</h1>
  {error_block}
  <form method="post" action="/authenticate">
    <input type="hidden" name="state" value="{state}">
    <input type="hidden" name="redirect_uri" value="{redirect_uri}">
    <label>Email <input type="email" name="email" required></label>
    <label>Password <input type="password" name="password" required></label>
    <button type="submit">Sign in</button>
  </form>
</body>
</html>"#,
        error_block = error_block,
        state = escape(state),
        redirect_uri = escape(redirect_uri),
    )
}

/// Success page for the direct-login flow, embedding the authorization code
/// for the IDE to copy or scrape.
pub fn success_page(code: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authorization complete</title></head>
<body>
  <h1>Authorization complete</h1>
  <p>Return to your editor. If it does not pick the code up automatically,
  paste it manually:</p>
  <code id="authorization-code">{}</code>
</body>
</html>"#,
        escape(code)
    )
}
