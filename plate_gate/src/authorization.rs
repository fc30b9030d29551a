use crate::metrics;
use crate::plate::NormalizedPlate;
use crate::registry::{VehicleRecord, VehicleRegistry};

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Authorized(VehicleRecord),
    Unknown(NormalizedPlate),
}

impl Status {
    pub fn plate(&self) -> &NormalizedPlate {
        match self {
            Status::Authorized(record) => &record.plate,
            Status::Unknown(plate) => plate,
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, Status::Authorized(_))
    }

    /// Text drawn next to the plate box.
    pub fn label(&self) -> String {
        match self {
            Status::Authorized(record) => format!("{} AUTHORIZED", record.plate),
            Status::Unknown(plate) => format!("{} UNKNOWN", plate),
        }
    }

    /// Operator-facing status line.
    pub fn status_line(&self) -> String {
        match self {
            Status::Authorized(record) => format!(
                "Authorized: {} | {} → {}",
                record.plate, record.origin, record.destination
            ),
            Status::Unknown(plate) => format!("Unknown Vehicle Detected: {}", plate),
        }
    }
}

/// Request to show the route of a newly sighted authorized vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideEffectRequest {
    pub plate: NormalizedPlate,
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub status: Status,
    pub side_effect: Option<SideEffectRequest>,
}

/// Last plate a route was shown for. Only an authorized plate different from the
/// remembered one triggers a new route; unknown plates leave the slot alone.
#[derive(Debug, Default, Clone)]
pub struct Debounce {
    last_actioned: Option<NormalizedPlate>,
}

impl Debounce {
    pub fn last_actioned(&self) -> Option<&NormalizedPlate> {
        self.last_actioned.as_ref()
    }

    pub fn clear(&mut self) {
        self.last_actioned = None;
    }

    /// `plate` must not be empty; callers skip empty readings.
    pub fn decide(&mut self, plate: &NormalizedPlate, registry: &VehicleRegistry) -> Decision {
        match registry.lookup(plate) {
            Some(record) => {
                metrics::DECISIONS.with_label_values(&["authorized"]).inc();
                let side_effect = if self.last_actioned.as_ref() != Some(plate) {
                    self.last_actioned = Some(plate.clone());
                    Some(SideEffectRequest {
                        plate: plate.clone(),
                        origin: record.origin.clone(),
                        destination: record.destination.clone(),
                    })
                } else {
                    None
                };
                Decision {
                    status: Status::Authorized(record),
                    side_effect,
                }
            }
            None => {
                metrics::DECISIONS.with_label_values(&["unknown"]).inc();
                Decision {
                    status: Status::Unknown(plate.clone()),
                    side_effect: None,
                }
            }
        }
    }
}
