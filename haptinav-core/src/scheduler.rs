//! Maneuver announcement state machine
//!
//! Once per fix the scheduler picks the instruction to announce and its
//! distance. The announcement cursor (`last_announced`) only moves forward
//! within one route version and restarts at -1 with every new route.
//!
//! | State | Condition | Reported |
//! |-------|-----------|----------|
//! | Idle | no candidate ahead | code 0, no distance |
//! | Approaching | next instruction within the announce radius | its code and distance |
//! | Fired | a candidate within the fire radius | the following instruction |
//! | Idle | nearest candidate further away | code 0 and its distance |
//!
//! Candidates are instructions after the cursor whose bearing from the
//! current position lies within the bearing cone around the heading. The
//! cone hides instructions that are close but behind or beside the
//! traveler, e.g. on a parallel road.
//!
//! The instruction directly after the cursor is only ever approached. Once
//! it drops out of the cone the next candidate takes over, and that one
//! fires within the fire radius. With an entry and an exit instruction per
//! maneuver, the entry point pre-announces and the exit point fires and
//! hands over to the following maneuver.

use serde::{Deserialize, Serialize};

use crate::geo::{haversine_distance, initial_bearing, signed_angle_difference, GeoPoint};
use crate::route::{maneuver::CODE_CONTINUE, RouteModel};

pub const DEFAULT_ANNOUNCE_DISTANCE_M: f64 = 80.0;
pub const DEFAULT_FIRE_DISTANCE_M: f64 = 40.0;
pub const DEFAULT_BEARING_CONE_DEG: f64 = 90.0;

/// Below this distance the bearing to an instruction is meaningless and the
/// instruction counts as ahead.
const SAME_POINT_M: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Approaching,
    Fired,
}

impl Default for SchedulerState {
    fn default() -> Self {
        SchedulerState::Idle
    }
}

/// What to tell the traveler after one fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub state: SchedulerState,
    pub maneuver_code: i32,
    /// Distance to the announced maneuver; `None` when nothing lies ahead
    pub distance_m: Option<f64>,
    /// Index of the reported instruction, if any
    pub instruction_idx: Option<usize>,
}

impl Announcement {
    fn idle(distance_m: Option<f64>) -> Self {
        Announcement {
            state: SchedulerState::Idle,
            maneuver_code: CODE_CONTINUE,
            distance_m,
            instruction_idx: None,
        }
    }
}

/// Radii and cone of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSettings {
    pub announce_distance_m: f64,
    pub fire_distance_m: f64,
    pub bearing_cone_deg: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            announce_distance_m: DEFAULT_ANNOUNCE_DISTANCE_M,
            fire_distance_m: DEFAULT_FIRE_DISTANCE_M,
            bearing_cone_deg: DEFAULT_BEARING_CONE_DEG,
        }
    }
}

/// Pure scheduling step
///
/// Returns the announcement and the cursor after this fix. The cursor is
/// never lower than `last_announced`.
pub fn schedule(
    settings: &SchedulerSettings,
    position: &GeoPoint,
    heading_deg: f32,
    route: &RouteModel,
    last_announced: i64,
) -> (Announcement, i64) {
    let instructions = route.instructions();

    let mut nearest: Option<(usize, f64)> = None;
    for (idx, instruction) in instructions.iter().enumerate() {
        if (idx as i64) <= last_announced {
            continue;
        }
        let d = haversine_distance(position, &instruction.location);
        if d >= SAME_POINT_M {
            let bearing = initial_bearing(position, &instruction.location);
            let off_axis = signed_angle_difference(bearing, heading_deg as f64);
            if off_axis.abs() > settings.bearing_cone_deg {
                continue;
            }
        }
        match nearest {
            Some((_, best)) if best <= d => {}
            _ => nearest = Some((idx, d)),
        }
    }

    let (idx, d) = match nearest {
        Some(n) => n,
        None => return (Announcement::idle(None), last_announced),
    };
    let candidate = &instructions[idx];

    if d < settings.announce_distance_m && idx as i64 == last_announced + 1 {
        let announcement = Announcement {
            state: SchedulerState::Approaching,
            maneuver_code: candidate.maneuver_code,
            distance_m: Some(d),
            instruction_idx: Some(idx),
        };
        return (announcement, last_announced);
    }

    if d < settings.fire_distance_m {
        let cursor = (idx as i64).max(last_announced);
        // Announce the next leg right away; without one, the fired
        // instruction itself stays on display.
        let announcement = match instructions.get(idx + 1) {
            Some(next) => Announcement {
                state: SchedulerState::Fired,
                maneuver_code: next.maneuver_code,
                distance_m: Some(haversine_distance(position, &next.location)),
                instruction_idx: Some(idx + 1),
            },
            None => Announcement {
                state: SchedulerState::Fired,
                maneuver_code: candidate.maneuver_code,
                distance_m: Some(d),
                instruction_idx: Some(idx),
            },
        };
        return (announcement, cursor);
    }

    (Announcement::idle(Some(d)), last_announced)
}

/// Announcement cursor for one route version
///
/// The cursor indexes [`RouteModel::instructions`], not route points. With an
/// entry and an exit instruction per maneuver it can exceed the point count.
#[derive(Debug, Clone)]
pub struct InstructionScheduler {
    settings: SchedulerSettings,
    last_announced: i64,
    state: SchedulerState,
}

impl InstructionScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        InstructionScheduler {
            settings,
            last_announced: -1,
            state: SchedulerState::Idle,
        }
    }

    pub fn last_announced(&self) -> i64 {
        self.last_announced
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Announcement for a fix without moving the cursor
    pub fn evaluate(&self, position: &GeoPoint, heading_deg: f32, route: &RouteModel) -> Announcement {
        schedule(&self.settings, position, heading_deg, route, self.last_announced).0
    }

    /// Announcement for a fix, advancing the cursor when an instruction fires
    pub fn update(&mut self, position: &GeoPoint, heading_deg: f32, route: &RouteModel) -> Announcement {
        let (announcement, cursor) =
            schedule(&self.settings, position, heading_deg, route, self.last_announced);
        if cursor > self.last_announced {
            log::debug!(
                "Instruction {} fired (route v{}), next code {}",
                cursor,
                route.version(),
                announcement.maneuver_code
            );
            self.last_announced = cursor;
        }
        self.state = announcement.state;
        announcement
    }

    /// Forget the cursor; used when the route is replaced
    pub fn reset(&mut self) {
        self.last_announced = -1;
        self.state = SchedulerState::Idle;
    }
}
