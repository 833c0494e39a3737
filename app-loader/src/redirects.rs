// app-loader/src/redirects.rs
use crate::error::UpstreamError;
use crate::upstream::{CookieJar, UpstreamClient, UpstreamRequest, UpstreamResponse};

/// Most requests issued while resolving one redirect chain
pub const MAX_REDIRECTS: usize = 10;

/// Follow `response` through its redirects, carrying `jar` along.
///
/// Returns the first non-redirect response, or `None` when it is still
/// redirecting after [`MAX_REDIRECTS`] hops.
pub async fn follow_redirects(
    upstream: &dyn UpstreamClient,
    response: UpstreamResponse,
    jar: &mut CookieJar,
) -> Result<Option<UpstreamResponse>, UpstreamError> {
    let mut response = response;

    for hop in 1..=MAX_REDIRECTS {
        let target = match response.redirect_location() {
            Some(location) => response.url.join(location)?,
            None => return Ok(Some(response)),
        };
        tracing::debug!("Following redirect {} to {}", hop, target);
        response = upstream.execute(&UpstreamRequest::get(target), jar).await?;
    }

    if response.redirect_location().is_some() {
        tracing::warn!(
            "Still redirecting after {} hops (last {}), giving up",
            MAX_REDIRECTS,
            response.url
        );
        return Ok(None);
    }
    Ok(Some(response))
}
