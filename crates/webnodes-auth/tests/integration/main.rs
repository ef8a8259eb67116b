//! Integration tests for webnodes-auth
//!
//! Uses wiremock to simulate a provider's token and profile endpoints and
//! verifies the authorization round trip through the admin routes, the CSRF
//! checks, token refresh, and the hyper server.


mod test_authorization;
mod test_refresh;
