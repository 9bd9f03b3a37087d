//! Unit tests for launch-time control record handling

use candlecast::dispatch::handlers::needs_reset;
use candlecast::models::ControlState;

#[test]
fn test_launch_clears_terminal_leftovers() {
    assert!(needs_reset(ControlState::Delete));
    assert!(needs_reset(ControlState::Deleted));
    assert!(needs_reset(ControlState::Error));
}

#[test]
fn test_launch_preserves_pending_start_signal() {
    // The orchestrator writes START right after dropping the descriptor
    // file; by the time the queue worker runs the launch, that record must
    // still be there for the consumer's start loop to find.
    assert!(!needs_reset(ControlState::Start));
    assert!(!needs_reset(ControlState::Running));
}

#[test]
fn test_launch_leaves_live_and_absent_records_alone() {
    assert!(!needs_reset(ControlState::Unknown));
    assert!(!needs_reset(ControlState::Pending));
    assert!(!needs_reset(ControlState::Wait));
    assert!(!needs_reset(ControlState::Paused));
}
