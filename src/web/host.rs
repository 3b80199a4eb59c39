//! Scene host backed by a JavaScript object

use std::cell::RefCell;

use glam::{DMat4, DVec3};
use js_sys::{Array, Float64Array, Function, Reflect};
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::core::{GeoTransform, SpatialReference};
use crate::renderer::SceneHost;

/// Look up a function member on `obj`.
pub(crate) fn function(obj: &JsValue, name: &str) -> Result<Option<Function>, JsError> {
    let value = Reflect::get(obj, &JsValue::from_str(name))
        .map_err(|_| JsError::new(&format!("cannot read host.{name}")))?;
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    value
        .dyn_into::<Function>()
        .map(Some)
        .map_err(|_| JsError::new(&format!("host.{name} is not a function")))
}

fn required(obj: &JsValue, name: &str) -> Result<Function, JsError> {
    function(obj, name)?.ok_or_else(|| JsError::new(&format!("host.{name} is missing")))
}

/// Host services forwarded to JS:
///
/// - `toRenderCoordinates([x, y, z], spatialReference) -> [x, y, z] | null`
/// - `renderCoordinateTransformAt([x, y, z], spatialReference) -> number[16] | null`
/// - `requestRender()`
pub struct JsHost {
    this: JsValue,
    to_render: Function,
    transform_at: Function,
    request: Function,
    /// Last spatial reference converted to a JS object
    sr_cache: RefCell<Option<(SpatialReference, JsValue)>>,
}

impl JsHost {
    pub fn new(this: JsValue) -> Result<Self, JsError> {
        Ok(Self {
            to_render: required(&this, "toRenderCoordinates")?,
            transform_at: required(&this, "renderCoordinateTransformAt")?,
            request: required(&this, "requestRender")?,
            this,
            sr_cache: RefCell::new(None),
        })
    }

    fn spatial_reference(&self, sr: &SpatialReference) -> JsValue {
        let mut cache = self.sr_cache.borrow_mut();
        if let Some((cached, value)) = cache.as_ref() {
            if cached == sr {
                return value.clone();
            }
        }
        let value = serde_json::to_string(sr)
            .ok()
            .and_then(|json| js_sys::JSON::parse(&json).ok())
            .unwrap_or(JsValue::NULL);
        *cache = Some((sr.clone(), value.clone()));
        value
    }

    /// Call `f(point, sr)` and read back a flat number array.
    fn call(&self, f: &Function, name: &str, point: DVec3, sr: &SpatialReference) -> Option<Vec<f64>> {
        let coords = Array::of3(
            &JsValue::from_f64(point.x),
            &JsValue::from_f64(point.y),
            &JsValue::from_f64(point.z),
        );
        let result = match f.call2(&self.this, &coords, &self.spatial_reference(sr)) {
            Ok(result) => result,
            Err(e) => {
                warn!(call = name, error = ?e, "Host call threw");
                return None;
            }
        };
        if result.is_falsy() {
            return None;
        }
        Some(Float64Array::new(&result).to_vec())
    }
}

impl GeoTransform for JsHost {
    fn to_render_coordinates(&self, point: DVec3, sr: &SpatialReference) -> Option<DVec3> {
        let out = self.call(&self.to_render, "toRenderCoordinates", point, sr)?;
        (out.len() >= 3).then(|| DVec3::new(out[0], out[1], out[2]))
    }

    fn render_coordinate_transform_at(&self, point: DVec3, sr: &SpatialReference) -> Option<DMat4> {
        let out = self.call(&self.transform_at, "renderCoordinateTransformAt", point, sr)?;
        let cols: [f64; 16] = out.get(..16)?.try_into().ok()?;
        Some(DMat4::from_cols_array(&cols))
    }
}

impl SceneHost for JsHost {
    fn request_render(&self) {
        if let Err(e) = self.request.call0(&self.this) {
            warn!(error = ?e, "requestRender threw");
        }
    }
}
