use std::fmt;
use tonic::Status;
use tracing::{field, Span};

/// Records a value on a field of the current span and hands it back, so it
/// can sit in the middle of a call chain.
pub(crate) trait Record: Sized {
  fn record_field(self, field: &'static str) -> Self;

  #[inline]
  fn record_request(self) -> Self {
    self.record_field("request")
  }

  #[inline]
  fn record_response(self) -> Self {
    self.record_field("response")
  }
}

impl<T: fmt::Debug> Record for T {
  #[inline]
  fn record_field(self, field: &'static str) -> Self {
    Span::current().record(field, field::debug(&self));
    self
  }
}

#[inline]
pub(crate) fn record_request<T: fmt::Debug>(request: T) -> T {
  request.record_request()
}

/// Records the code of a failed call on the `code` field. Spans of calls
/// that succeed leave it empty.
#[inline]
pub(crate) fn record_code(status: Status) -> Status {
  Span::current().record("code", field::debug(status.code()));
  status
}
