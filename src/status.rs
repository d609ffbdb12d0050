//! Named [`HttpError`] constructors for every standard 4xx and 5xx status.
//!
//! Each takes an optional override message; `None` (or an empty string)
//! yields the standard reason phrase for the code.
//!
//! ```rust
//! use deferr::HttpError;
//!
//! let e = HttpError::unprocessable_entity(Some("email is malformed"));
//! assert_eq!(e.status().as_u16(), 422);
//!
//! let e = HttpError::service_unavailable(None);
//! assert_eq!(e.message(), "Service Unavailable");
//! ```

use http::StatusCode;

use crate::failure::HttpError;

macro_rules! catalog {
    ($($(#[$doc:meta])* $name:ident => $code:literal,)*) => {
        impl HttpError {
            $(
                $(#[$doc])*
                pub fn $name(message: Option<&str>) -> Self {
                    Self::from_code($code, message)
                }
            )*
        }

        #[cfg(test)]
        const CATALOG: &[(fn(Option<&str>) -> HttpError, u16)] = &[
            $((HttpError::$name, $code),)*
        ];
    };
}

impl HttpError {
    // Every catalog code is a valid status, so the fallback never fires.
    fn from_code(code: u16, message: Option<&str>) -> Self {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::from_status(status, message)
    }
}

catalog! {
    // ── 4xx Client errors ─────────────────────────────────────────────────────
    bad_request                     => 400,
    unauthorized                    => 401,
    payment_required                => 402,
    forbidden                       => 403,
    not_found                       => 404,
    method_not_allowed              => 405,
    not_acceptable                  => 406,
    proxy_auth_required             => 407,
    request_timeout                 => 408,
    conflict                        => 409,
    gone                            => 410,
    length_required                 => 411,
    precondition_failed             => 412,
    payload_too_large               => 413,
    uri_too_long                    => 414,
    unsupported_media_type          => 415,
    range_not_satisfiable           => 416,
    expectation_failed              => 417,
    /// `418 I'm a teapot` (RFC 2324).
    teapot                          => 418,
    misdirected_request             => 421,
    unprocessable_entity            => 422,
    locked                          => 423,
    failed_dependency               => 424,
    too_early                       => 425,
    upgrade_required                => 426,
    precondition_required           => 428,
    too_many_requests               => 429,
    request_header_fields_too_large => 431,
    unavailable_for_legal_reasons   => 451,

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    /// Also the fallback for any failure that is not an [`HttpError`].
    internal_server_error           => 500,
    not_implemented                 => 501,
    bad_gateway                     => 502,
    service_unavailable             => 503,
    gateway_timeout                 => 504,
    http_version_not_supported      => 505,
    variant_also_negotiates         => 506,
    insufficient_storage            => 507,
    loop_detected                   => 508,
    not_extended                    => 510,
    network_authentication_required => 511,
}
