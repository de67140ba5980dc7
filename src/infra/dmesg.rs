//! Kernel ring buffer access.

use crate::infra::command::CommandRequest;

/// Empties the ring buffer so a later read only holds messages from the test.
pub fn clear_request() -> CommandRequest {
    CommandRequest::shell("dmesg -C").sudo()
}

pub fn read_request() -> CommandRequest {
    CommandRequest::shell("dmesg").sudo()
}
