//! Bearer authorization for outgoing requests.

use reqwest::blocking::RequestBuilder;
use reqwest::header::{AUTHORIZATION, HeaderValue};

use crate::error::{Result, TokenError};
use crate::source::ProviderTokenSource;

/// Attach the current token from `source` as the `Authorization` header.
///
/// The source is asked for a token on every call, so a wrapped
/// [`crate::source::PersistentTokenSource`] persists any refresh before the
/// request goes out.
pub fn authorize(request: RequestBuilder, source: &dyn ProviderTokenSource) -> Result<RequestBuilder> {
    let token = source.token()?;
    let mut value = HeaderValue::from_str(&token.authorization_header())
        .map_err(|_| TokenError::Upstream("access token is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(request.header(AUTHORIZATION, value))
}
