//! Ground equipment (radar stations) seeded from the snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tacsync_core::Coordinate;

use crate::wire;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Equipment {
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
    /// Coverage areas and other producer-specific attributes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Equipment collection plus the layer's visibility flag.
#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentLayer {
    pub items: Vec<Equipment>,
    pub visible: bool,
}

impl Default for EquipmentLayer {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            visible: true,
        }
    }
}

impl EquipmentLayer {
    pub fn set(&mut self, items: Vec<Equipment>) {
        self.items = items;
    }

    /// Drop every item whose id is listed.
    pub fn delete(&mut self, ids: &[String]) -> usize {
        let before = self.items.len();
        self.items.retain(|e| !ids.contains(&e.id));
        before - self.items.len()
    }

    pub fn toggle_visible(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    /// Items drawn on the map: nothing while the layer is hidden.
    pub fn visible_items(&self) -> &[Equipment] {
        if self.visible {
            &self.items
        } else {
            &[]
        }
    }
}

/// Coverage sector around a station.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sector {
    pub center_coordinates: Coordinate,
    pub radius_in_meters: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

const SECTOR_STEP_DEG: f64 = 5.0;

impl Sector {
    /// Closed polygon: centre, arc points every 5 degrees ending exactly at
    /// `end_angle`, centre again. Empty for a degenerate sector.
    pub fn outline(&self) -> Vec<Coordinate> {
        if self.radius_in_meters <= 0.0 || self.end_angle < self.start_angle {
            return Vec::new();
        }
        let center = self.center_coordinates;
        let mut points = vec![center];
        let mut angle = self.start_angle;
        while angle <= self.end_angle {
            points.push(center.destination(self.radius_in_meters, angle));
            angle += SECTOR_STEP_DEG;
        }
        if angle - SECTOR_STEP_DEG < self.end_angle {
            points.push(center.destination(self.radius_in_meters, self.end_angle));
        }
        points.push(center);
        points
    }
}
