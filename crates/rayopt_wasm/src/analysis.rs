//! Exact-trace analyses: spot diagrams and field curves.

use crate::lens::{paraxial_trace, WasmLens};
use anyhow::{bail, Context};
use rayopt_core::full::{FanSettings, FieldCurves, FullTrace, Spot};
use rayopt_core::{OpticalSystem, ParaxialSettings};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// Image-plane ray positions of one field point plus their statistics.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SpotDiagram {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub spot: Option<Spot>,
    pub rays: usize,
}

fn check_fan(fan: &FanSettings) -> anyhow::Result<()> {
    if fan.rays == 0 {
        bail!("A ray fan needs at least one ray.");
    }
    if !(fan.epsilon > 0.0) {
        bail!("Fan epsilon must be positive, got {}.", fan.epsilon);
    }
    Ok(())
}

pub(crate) fn spot_diagram(
    system: &OpticalSystem,
    settings: ParaxialSettings,
    height: (f64, f64),
    wavelength: f64,
    fan: &FanSettings,
) -> anyhow::Result<SpotDiagram> {
    check_fan(fan)?;
    let paraxial = paraxial_trace(system, settings)?;
    let mut full = FullTrace::new(system.clone(), 0);
    full.rays_for_point(&paraxial, height, wavelength, fan.rays, fan.distribution);
    full.propagate(true);
    let image = system.image_index();
    let (x, y) = full.y()[image]
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| (p.x, p.y))
        .unzip();
    Ok(SpotDiagram {
        x,
        y,
        spot: full.spot(image),
        rays: full.nrays(),
    })
}

pub(crate) fn field_curves(
    system: &OpticalSystem,
    settings: ParaxialSettings,
    wavelength: f64,
    fan: &FanSettings,
) -> anyhow::Result<FieldCurves> {
    check_fan(fan)?;
    let paraxial = paraxial_trace(system, settings)?;
    let mut full = FullTrace::new(system.clone(), 0);
    full.rays_for_object(&paraxial, wavelength, fan.rays, fan.epsilon);
    full.propagate(false);
    full.field_curves(&paraxial)
        .context("field curve evaluation failed")
}

fn fan_settings(settings_val: JsValue) -> Result<FanSettings, JsValue> {
    if settings_val.is_undefined() || settings_val.is_null() {
        return Ok(FanSettings::default());
    }
    from_value(settings_val)
        .map_err(|e| JsValue::from_str(&format!("Invalid fan settings: {}", e)))
}

#[wasm_bindgen]
impl WasmLens {
    /// Spot diagram for the field point `(hx, hy)` in fractions of the object
    /// radius.
    pub fn compute_spot(
        &self,
        hx: f64,
        hy: f64,
        wavelength: f64,
        settings_val: JsValue,
    ) -> Result<JsValue, JsValue> {
        let fan = fan_settings(settings_val)?;
        let diagram = spot_diagram(&self.system, self.settings, (hx, hy), wavelength, &fan)
            .map_err(|e| JsValue::from_str(&format!("Spot computation failed: {:#}", e)))?;
        to_value(&diagram).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Distortion and tangential/sagittal focus against image height.
    pub fn compute_field_curves(
        &self,
        wavelength: f64,
        settings_val: JsValue,
    ) -> Result<JsValue, JsValue> {
        let fan = fan_settings(settings_val)?;
        let curves = field_curves(&self.system, self.settings, wavelength, &fan)
            .map_err(|e| JsValue::from_str(&format!("Field curve computation failed: {:#}", e)))?;
        to_value(&curves).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}
