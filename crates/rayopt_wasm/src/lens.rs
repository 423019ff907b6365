//! Core WASM lens wrapper: system ownership, paraxial summaries and solves.

use anyhow::Context;
use js_sys::Float64Array;
use rayopt_core::paraxial::{CHIEF, MARGINAL};
use rayopt_core::{OpticalSystem, ParaxialSettings, ParaxialTrace};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmLens {
    pub(crate) system: OpticalSystem,
    pub(crate) settings: ParaxialSettings,
}

/// First-order properties as plain numbers for the UI.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ParaxialSummary {
    pub lagrange: f64,
    pub track: f64,
    pub focal_length: f64,
    pub height: (f64, f64),
    pub focal_distance: (f64, f64),
    pub pupil_position: (f64, f64),
    pub pupil_height: (f64, f64),
    pub numerical_aperture: (f64, f64),
    pub f_number: (f64, f64),
    pub airy_radius: (f64, f64),
    pub magnification: (f64, f64),
    pub type_codes: Vec<String>,
}

pub(crate) fn paraxial_trace(
    system: &OpticalSystem,
    settings: ParaxialSettings,
) -> anyhow::Result<ParaxialTrace> {
    let mut paraxial =
        ParaxialTrace::new(system.clone(), settings).context("paraxial setup failed")?;
    paraxial
        .propagate(0, None)
        .context("paraxial propagation failed")?;
    Ok(paraxial)
}

pub(crate) fn summarize(paraxial: &ParaxialTrace) -> ParaxialSummary {
    ParaxialSummary {
        lagrange: paraxial.lagrange(),
        track: paraxial.track(),
        focal_length: paraxial.focal_length(),
        height: paraxial.height(),
        focal_distance: paraxial.focal_distance(),
        pupil_position: paraxial.pupil_position(),
        pupil_height: paraxial.pupil_height(),
        numerical_aperture: paraxial.numerical_aperture(),
        f_number: paraxial.f_number(),
        airy_radius: paraxial.airy_radius(),
        magnification: paraxial.magnification(),
        type_codes: paraxial
            .system()
            .type_codes()
            .into_iter()
            .map(String::from)
            .collect(),
    }
}

/// Runs `solve` on a fresh paraxial trace and returns the modified system.
pub(crate) fn solved_system<F>(
    system: &OpticalSystem,
    settings: ParaxialSettings,
    solve: F,
) -> anyhow::Result<OpticalSystem>
where
    F: FnOnce(&mut ParaxialTrace) -> rayopt_core::Result<()>,
{
    let mut paraxial = paraxial_trace(system, settings)?;
    solve(&mut paraxial).context("solve failed")?;
    Ok(paraxial.into_system())
}

fn to_js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{:#}", err))
}

#[wasm_bindgen]
impl WasmLens {
    /// Builds a lens from a system description (`object`, `surfaces`,
    /// `aperture_index`).
    #[wasm_bindgen(constructor)]
    pub fn new(description_val: JsValue) -> Result<WasmLens, JsValue> {
        console_error_panic_hook::set_once();

        let system: OpticalSystem = from_value(description_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid system description: {}", e)))?;

        Ok(WasmLens {
            system,
            settings: ParaxialSettings::default(),
        })
    }

    pub fn set_aberration_order(&mut self, order: u32) -> Result<(), JsValue> {
        if order < 3 {
            return Err(JsValue::from_str("Aberration order must be at least 3."));
        }
        self.settings.aberration_order = order as usize;
        Ok(())
    }

    pub fn get_description(&self) -> Result<JsValue, JsValue> {
        to_value(&self.system)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn paraxial_summary(&self) -> Result<JsValue, JsValue> {
        let paraxial = paraxial_trace(&self.system, self.settings).map_err(to_js_error)?;
        to_value(&summarize(&paraxial))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Marginal and chief ray heights per element, interleaved.
    pub fn paraxial_heights(&self) -> Result<Float64Array, JsValue> {
        let paraxial = paraxial_trace(&self.system, self.settings).map_err(to_js_error)?;
        let heights: Vec<f64> = paraxial
            .y()
            .iter()
            .flat_map(|y| [y[MARGINAL], y[CHIEF]])
            .collect();
        Ok(Float64Array::from(heights.as_slice()))
    }

    /// Parameter block, paraxial ray table and aberration tables.
    pub fn report(&self) -> Result<String, JsValue> {
        let paraxial = paraxial_trace(&self.system, self.settings).map_err(to_js_error)?;
        Ok(paraxial.to_string())
    }

    /// Bends element `index` (default: last optical surface) to focal length
    /// `f`.
    pub fn solve_focal_length(&mut self, f: f64, index: Option<u32>) -> Result<(), JsValue> {
        self.system = solved_system(&self.system, self.settings, |paraxial| {
            paraxial
                .focal_length_solve(f, index.map(|i| i as usize))
                .map(|_| ())
        })
        .map_err(to_js_error)?;
        Ok(())
    }

    pub fn solve_focal_plane(&mut self) -> Result<(), JsValue> {
        self.system = solved_system(&self.system, self.settings, |paraxial| {
            paraxial.focal_plane_solve().map(|_| ())
        })
        .map_err(to_js_error)?;
        Ok(())
    }

    pub fn size_elements(&mut self) -> Result<(), JsValue> {
        self.system = solved_system(&self.system, self.settings, |paraxial| {
            paraxial.size_elements();
            Ok(())
        })
        .map_err(to_js_error)?;
        Ok(())
    }
}
