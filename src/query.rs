//! Read-only selection of objects for exporters (map annotations, reports).
//!
//! Exporters never see the live model: they run an `ObjectQuery` against a
//! snapshot and get back a numbered list of 2D map positions.

use nalgebra::Vector2;

use crate::model::{ModelSnapshot, ObjectId, ObjectState};

/// Which objects an exporter wants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectQuery {
    /// Only objects of this class; `None` means every class.
    pub class_id: Option<String>,
    /// Also include objects that are not `Confirmed`.
    pub include_unconfirmed: bool,
}

/// One selected object, numbered from 1 in snapshot order.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberedObject {
    pub number: usize,
    pub id: ObjectId,
    pub class_id: String,
    pub name: Option<String>,
    pub state: ObjectState,
    pub position: Vector2<f64>,
}

impl ObjectQuery {
    /// Confirmed objects of every class.
    pub fn confirmed() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into()).filter(|c: &String| !c.is_empty());
        self
    }

    pub fn including_unconfirmed(mut self) -> Self {
        self.include_unconfirmed = true;
        self
    }

    pub fn select(&self, snapshot: &ModelSnapshot) -> Vec<NumberedObject> {
        snapshot
            .objects
            .iter()
            .filter(|obj| self.include_unconfirmed || obj.state == ObjectState::Confirmed)
            .filter(|obj| self.class_id.as_ref().is_none_or(|c| &obj.class_id == c))
            .enumerate()
            .map(|(i, obj)| {
                let position = obj.pose.position();
                NumberedObject {
                    number: i + 1,
                    id: obj.id.clone(),
                    class_id: obj.class_id.clone(),
                    name: obj.name.clone(),
                    state: obj.state,
                    position: Vector2::new(position.x, position.y),
                }
            })
            .collect()
    }
}
