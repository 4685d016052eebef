//! Drag session state machine.
//!
//! ```text
//! Idle ──press──> Pressed ──moved past threshold──> Dragging <──leave── Over
//!                    │                                 │  └──hover──────^ │
//!                    └──release: click─┐               └─release─┐        │ release
//!                                      v                         v        v
//!                                  Cancelled ──> Idle      Cancelled    Drop ──> Idle
//! ```
//!
//! The machine only tracks the pointer and previews plans. Committing a
//! drop is the controller's job.

use serde::{Deserialize, Serialize};

use super::models::{GroupId, ItemId};
use super::planner::{DropTarget, MovePlan, plan_move};
use super::state::BoardState;
use crate::errors::{BoardError, BoardResult};

/// Default pointer travel, in pixels, before a press turns into a drag.
pub const DEFAULT_DRAG_THRESHOLD_PX: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

impl PointerPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragPhase {
    Idle,
    /// Pointer is down on an item but has not travelled far enough.
    Pressed,
    Dragging,
    Over,
}

/// What the session captured at pickup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragContext {
    pub active_item_id: ItemId,
    pub origin_group_id: GroupId,
    pub origin_position: u32,
    pub press_point: PointerPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Released before crossing the threshold (a click).
    BelowThreshold,
    /// Released outside any droppable surface.
    NoTarget,
    /// Escape key, drag-source unmount, or similar.
    Explicit,
    /// The drop target was deleted while the drag was in flight.
    TargetGone,
}

/// Result of releasing the pointer.
#[derive(Debug, Clone, PartialEq)]
pub enum DragRelease {
    Drop {
        context: DragContext,
        target: DropTarget,
    },
    Cancelled {
        item_id: ItemId,
        reason: CancelReason,
    },
}

#[derive(Debug, Clone, Default)]
enum SessionState {
    #[default]
    Idle,
    Pressed(DragContext),
    Dragging(DragContext),
    Over {
        context: DragContext,
        target: DropTarget,
        preview: MovePlan,
    },
}

/// One board's drag session. At most one session is active at a time.
#[derive(Debug, Clone)]
pub struct DragMachine {
    state: SessionState,
    threshold_px: f64,
}

impl Default for DragMachine {
    fn default() -> Self {
        Self::new(DEFAULT_DRAG_THRESHOLD_PX)
    }
}

impl DragMachine {
    pub fn new(threshold_px: f64) -> Self {
        Self {
            state: SessionState::Idle,
            threshold_px: threshold_px.max(0.0),
        }
    }

    pub fn phase(&self) -> DragPhase {
        match &self.state {
            SessionState::Idle => DragPhase::Idle,
            SessionState::Pressed(_) => DragPhase::Pressed,
            SessionState::Dragging(_) => DragPhase::Dragging,
            SessionState::Over { .. } => DragPhase::Over,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, SessionState::Idle)
    }

    pub fn context(&self) -> Option<&DragContext> {
        match &self.state {
            SessionState::Idle => None,
            SessionState::Pressed(ctx) | SessionState::Dragging(ctx) => Some(ctx),
            SessionState::Over { context, .. } => Some(context),
        }
    }

    pub fn active_item(&self) -> Option<&ItemId> {
        self.context().map(|ctx| &ctx.active_item_id)
    }

    pub fn current_target(&self) -> Option<&DropTarget> {
        match &self.state {
            SessionState::Over { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Plan the drop would commit right now. Preview only.
    pub fn preview(&self) -> Option<&MovePlan> {
        match &self.state {
            SessionState::Over { preview, .. } => Some(preview),
            _ => None,
        }
    }

    /// Pointer-down on an item. With a zero threshold the session starts
    /// dragging immediately.
    pub fn press(
        &mut self,
        board: &BoardState,
        item_id: &ItemId,
        at: PointerPosition,
    ) -> BoardResult<DragPhase> {
        if let Some(active) = self.active_item() {
            return Err(BoardError::DragInProgress {
                active: active.clone(),
            });
        }
        let item = board
            .item(item_id)
            .ok_or_else(|| BoardError::ItemNotFound { id: item_id.clone() })?;
        let context = DragContext {
            active_item_id: item.id.clone(),
            origin_group_id: item.group_id.clone(),
            origin_position: item.position,
            press_point: at,
        };
        self.state = if self.threshold_px == 0.0 {
            SessionState::Dragging(context)
        } else {
            SessionState::Pressed(context)
        };
        tracing::debug!(item_id = %item_id, phase = ?self.phase(), "drag session started");
        Ok(self.phase())
    }

    /// Pointer movement. Promotes a press to a drag once either axis
    /// travels past the threshold.
    pub fn pointer_moved(&mut self, at: PointerPosition) -> DragPhase {
        if let SessionState::Pressed(ctx) = &self.state {
            let dx = (at.x - ctx.press_point.x).abs();
            let dy = (at.y - ctx.press_point.y).abs();
            if dx > self.threshold_px || dy > self.threshold_px {
                let ctx = ctx.clone();
                tracing::debug!(item_id = %ctx.active_item_id, "drag threshold crossed");
                self.state = SessionState::Dragging(ctx);
            }
        }
        self.phase()
    }

    /// Pointer entered (`Some`) or left (`None`) a droppable surface.
    ///
    /// Recomputes the preview on every call without committing anything.
    /// Ignored unless the session is dragging. If the active item vanished
    /// from the board the session is cancelled and the error returned.
    pub fn hover(
        &mut self,
        board: &BoardState,
        target: Option<DropTarget>,
    ) -> BoardResult<Option<&MovePlan>> {
        let context = match &self.state {
            SessionState::Dragging(ctx) => ctx.clone(),
            SessionState::Over { context, .. } => context.clone(),
            SessionState::Idle | SessionState::Pressed(_) => return Ok(None),
        };

        let Some(target) = target else {
            self.state = SessionState::Dragging(context);
            return Ok(None);
        };

        match plan_move(board, &context.active_item_id, &target) {
            Ok(preview) => {
                tracing::trace!(item_id = %context.active_item_id, drop_target = ?target, "drag preview updated");
                self.state = SessionState::Over {
                    context,
                    target,
                    preview,
                };
                Ok(self.preview())
            }
            Err(err) => {
                self.state = SessionState::Idle;
                Err(err)
            }
        }
    }

    /// Pointer-up. Always returns the machine to `Idle`.
    pub fn release(&mut self) -> BoardResult<DragRelease> {
        let released = match std::mem::take(&mut self.state) {
            SessionState::Idle => return Err(BoardError::NoActiveDrag),
            SessionState::Pressed(ctx) => DragRelease::Cancelled {
                item_id: ctx.active_item_id,
                reason: CancelReason::BelowThreshold,
            },
            SessionState::Dragging(ctx) => DragRelease::Cancelled {
                item_id: ctx.active_item_id,
                reason: CancelReason::NoTarget,
            },
            SessionState::Over {
                context, target, ..
            } => DragRelease::Drop { context, target },
        };
        Ok(released)
    }

    /// Abort any active session, discarding the preview. Returns the item
    /// that was being dragged.
    pub fn cancel(&mut self) -> Option<ItemId> {
        let item_id = self.active_item().cloned();
        self.state = SessionState::Idle;
        if let Some(id) = &item_id {
            tracing::debug!(item_id = %id, "drag session cancelled");
        }
        item_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::state::tests::sample_state;

    fn at(x: f64, y: f64) -> PointerPosition {
        PointerPosition::new(x, y)
    }

    fn dragging(board: &BoardState, id: &str) -> DragMachine {
        let mut machine = DragMachine::default();
        machine.press(board, &ItemId::from(id), at(0.0, 0.0)).unwrap();
        assert_eq!(machine.pointer_moved(at(20.0, 0.0)), DragPhase::Dragging);
        machine
    }

    #[test]
    fn press_captures_origin() {
        let board = sample_state();
        let mut machine = DragMachine::default();
        let phase = machine.press(&board, &ItemId::from("a2"), at(1.0, 1.0)).unwrap();
        assert_eq!(phase, DragPhase::Pressed);
        let ctx = machine.context().unwrap();
        assert_eq!(ctx.origin_group_id.as_str(), "a");
        assert_eq!(ctx.origin_position, 1);
    }

    #[test]
    fn small_movement_stays_pressed() {
        let board = sample_state();
        let mut machine = DragMachine::default();
        machine.press(&board, &ItemId::from("a1"), at(10.0, 10.0)).unwrap();
        assert_eq!(machine.pointer_moved(at(14.0, 13.0)), DragPhase::Pressed);
        assert_eq!(machine.pointer_moved(at(10.0, 16.0)), DragPhase::Dragging);
    }

    #[test]
    fn zero_threshold_drags_immediately() {
        let board = sample_state();
        let mut machine = DragMachine::new(0.0);
        let phase = machine.press(&board, &ItemId::from("a1"), at(0.0, 0.0)).unwrap();
        assert_eq!(phase, DragPhase::Dragging);
    }

    #[test]
    fn second_session_is_rejected() {
        let board = sample_state();
        let mut machine = dragging(&board, "a1");
        let err = machine
            .press(&board, &ItemId::from("b1"), at(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, BoardError::DragInProgress { .. }));
        assert_eq!(machine.active_item().unwrap().as_str(), "a1");
    }

    #[test]
    fn hover_recomputes_preview_each_time() {
        let board = sample_state();
        let mut machine = dragging(&board, "a1");

        let first = machine.hover(&board, Some(DropTarget::group("b"))).unwrap().cloned();
        assert!(matches!(first, Some(MovePlan::Move { position: 1, .. })));

        let second = machine.hover(&board, Some(DropTarget::item("b1"))).unwrap().cloned();
        assert!(matches!(second, Some(MovePlan::Move { position: 0, .. })));
        assert_eq!(machine.phase(), DragPhase::Over);
        assert_eq!(machine.current_target(), Some(&DropTarget::item("b1")));
    }

    #[test]
    fn leaving_surface_returns_to_dragging() {
        let board = sample_state();
        let mut machine = dragging(&board, "a1");
        machine.hover(&board, Some(DropTarget::group("b"))).unwrap();
        machine.hover(&board, None).unwrap();
        assert_eq!(machine.phase(), DragPhase::Dragging);
        assert!(machine.preview().is_none());
    }

    #[test]
    fn hover_before_threshold_is_ignored() {
        let board = sample_state();
        let mut machine = DragMachine::default();
        machine.press(&board, &ItemId::from("a1"), at(0.0, 0.0)).unwrap();
        assert!(machine.hover(&board, Some(DropTarget::group("b"))).unwrap().is_none());
        assert_eq!(machine.phase(), DragPhase::Pressed);
    }

    #[test]
    fn release_over_target_drops() {
        let board = sample_state();
        let mut machine = dragging(&board, "a1");
        machine.hover(&board, Some(DropTarget::item("b1"))).unwrap();
        let released = machine.release().unwrap();
        assert!(matches!(released, DragRelease::Drop { .. }));
        assert_eq!(machine.phase(), DragPhase::Idle);
    }

    #[test]
    fn release_without_target_cancels() {
        let board = sample_state();
        let mut machine = dragging(&board, "a1");
        let released = machine.release().unwrap();
        assert_eq!(
            released,
            DragRelease::Cancelled {
                item_id: ItemId::from("a1"),
                reason: CancelReason::NoTarget
            }
        );
    }

    #[test]
    fn release_while_pressed_is_a_click() {
        let board = sample_state();
        let mut machine = DragMachine::default();
        machine.press(&board, &ItemId::from("a1"), at(0.0, 0.0)).unwrap();
        let released = machine.release().unwrap();
        assert!(matches!(
            released,
            DragRelease::Cancelled {
                reason: CancelReason::BelowThreshold,
                ..
            }
        ));
    }

    #[test]
    fn release_when_idle_is_an_error() {
        let mut machine = DragMachine::default();
        assert!(matches!(machine.release(), Err(BoardError::NoActiveDrag)));
    }

    #[test]
    fn cancel_from_any_phase_returns_to_idle() {
        let board = sample_state();
        let mut machine = dragging(&board, "a1");
        machine.hover(&board, Some(DropTarget::group("b"))).unwrap();
        assert_eq!(machine.cancel(), Some(ItemId::from("a1")));
        assert_eq!(machine.phase(), DragPhase::Idle);
        assert_eq!(machine.cancel(), None);
    }

    #[test]
    fn hover_after_active_item_vanishes_cancels() {
        let mut board = sample_state();
        let mut machine = dragging(&board, "a1");
        board.take_item(&ItemId::from("a1"));
        let err = machine.hover(&board, Some(DropTarget::group("b"))).unwrap_err();
        assert!(matches!(err, BoardError::ItemNotFound { .. }));
        assert!(!machine.is_active());
    }
}
