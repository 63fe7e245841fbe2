//! Chronicle Planner - Volume Range Planning
//!
//! Maps a chapter number onto a volume (macro story arc). Persisted volume
//! records are trusted when plausible; generation may run a few chapters
//! past a volume's planned end before the next volume takes over. With no
//! usable record the range is estimated from the planning parameters and
//! flagged as a fallback.

pub mod params;
pub mod planner;
pub mod selection;

pub use params::{ParamSource, PlanningParams};
pub use planner::VolumePlanner;
pub use selection::{plan_volume, soft_buffer, SelectionSource, VolumeLookup, VolumeSelection};
