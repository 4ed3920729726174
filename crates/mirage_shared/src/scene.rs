//! # Built-in Replicated Classes
//!
//! Static schemas for the state the render context needs every frame:
//! transforms, visibility, camera parameters and the two global info blocks.
//!
//! Both contexts call [`register_scene_schemas`] on their own registry.

use mirage_core::{FieldValue, Schema, SchemaBuilder, SchemaError, SchemaRegistry};

use crate::constants::NAME_CAPACITY;

/// Scene-graph node class.
pub const SCENE_NODE: &str = "SceneNode";
/// Camera class.
pub const CAMERA: &str = "Camera";
/// Global block published by the game context.
pub const SIMULATION_INFO: &str = "SimulationInfo";
/// Global block published by the render context.
pub const RENDERING_INFO: &str = "RenderingInfo";

/// Position field names.
pub const POSITION: [&str; 3] = ["position_x", "position_y", "position_z"];
/// Rotation quaternion field names.
pub const ROTATION: [&str; 4] = ["rotation_x", "rotation_y", "rotation_z", "rotation_w"];
/// Scale field names.
pub const SCALE: [&str; 3] = ["scale_x", "scale_y", "scale_z"];

/// Vertical field of view a new camera starts with (60 degrees).
pub const DEFAULT_FOV_Y: f32 = std::f32::consts::FRAC_PI_3;
/// Near plane a new camera starts with.
pub const DEFAULT_NEAR: f32 = 0.1;
/// Far plane a new camera starts with.
pub const DEFAULT_FAR: f32 = 1000.0;

/// `SceneNode`: transform, visibility, parent and name.
///
/// New nodes start at [`Transform::IDENTITY`].
///
/// # Errors
///
/// Only fails if the static definition itself is broken.
pub fn scene_node_schema() -> Result<Schema, SchemaError> {
    let builder = POSITION
        .iter()
        .chain(&ROTATION)
        .chain(&SCALE)
        .fold(SchemaBuilder::new(SCENE_NODE), |builder, name| builder.f32(name));
    let identity = Transform::IDENTITY;
    let builder = ROTATION
        .iter()
        .zip(identity.rotation)
        .chain(SCALE.iter().zip(identity.scale))
        .fold(builder, |builder, (name, value)| builder.default_value(name, value));
    builder
        .boolean("visible")
        .reference("parent")
        .string("name", NAME_CAPACITY)
        .render_proxy("SceneNodeProxy")
        .build()
}

/// `Camera`: eye position, orientation and projection parameters.
///
/// # Errors
///
/// Only fails if the static definition itself is broken.
pub fn camera_schema() -> Result<Schema, SchemaError> {
    POSITION
        .iter()
        .fold(SchemaBuilder::new(CAMERA), |builder, name| builder.f32(name))
        .f32("yaw")
        .f32("pitch")
        .f32("fov_y")
        .f32("near")
        .f32("far")
        .default_value("fov_y", DEFAULT_FOV_Y)
        .default_value("near", DEFAULT_NEAR)
        .default_value("far", DEFAULT_FAR)
        .boolean("active")
        .render_proxy("CameraProxy")
        .build()
}

/// `SimulationInfo`: tick counter and simulated time.
///
/// # Errors
///
/// Only fails if the static definition itself is broken.
pub fn simulation_info_schema() -> Result<Schema, SchemaError> {
    SchemaBuilder::new(SIMULATION_INFO)
        .u32("tick")
        .f32("time")
        .f32("delta")
        .build()
}

/// `RenderingInfo`: last drawn frame, the tick it showed, viewport size.
///
/// # Errors
///
/// Only fails if the static definition itself is broken.
pub fn rendering_info_schema() -> Result<Schema, SchemaError> {
    SchemaBuilder::new(RENDERING_INFO)
        .u32("frame")
        .u32("published_tick")
        .u16("width")
        .u16("height")
        .build()
}

/// Registers every built-in class on `registry`.
///
/// # Errors
///
/// Returns [`SchemaError::AlreadyDefined`] if called twice on one registry.
pub fn register_scene_schemas(registry: &SchemaRegistry) -> Result<(), SchemaError> {
    registry.register(scene_node_schema()?)?;
    registry.register(camera_schema()?)?;
    registry.register(simulation_info_schema()?)?;
    registry.register(rendering_info_schema()?)?;
    Ok(())
}

/// Position, rotation and scale as plain numbers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation.
    pub position: [f32; 3],
    /// Rotation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
    /// Per-axis scale.
    pub scale: [f32; 3],
}

impl Transform {
    /// No translation, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        position: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0; 3],
    };

    /// Identity rotation and scale at `position`.
    #[must_use]
    pub const fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Field assignments for a `SceneNode`.
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        POSITION
            .iter()
            .zip(self.position)
            .chain(ROTATION.iter().zip(self.rotation))
            .chain(SCALE.iter().zip(self.scale))
            .map(|(&name, value)| (name, FieldValue::F32(value)))
            .collect()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Decoded `SimulationInfo` block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SimulationInfo {
    /// Simulation tick that was flushed.
    pub tick: u32,
    /// Simulated time in seconds.
    pub time: f32,
    /// Length of one tick in seconds.
    pub delta: f32,
}

impl SimulationInfo {
    /// Field values in schema order.
    #[must_use]
    pub fn values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::U32(self.tick),
            FieldValue::F32(self.time),
            FieldValue::F32(self.delta),
        ]
    }

    /// Rebuilds the block from decoded values; `None` if the layout differs.
    #[must_use]
    pub fn from_values(values: &[FieldValue]) -> Option<Self> {
        match values {
            [FieldValue::U32(tick), FieldValue::F32(time), FieldValue::F32(delta)] => Some(Self {
                tick: *tick,
                time: *time,
                delta: *delta,
            }),
            _ => None,
        }
    }
}

/// Decoded `RenderingInfo` block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderingInfo {
    /// Frames drawn so far.
    pub frame: u32,
    /// Simulation tick visible in the last frame.
    pub published_tick: u32,
    /// Surface width.
    pub width: u16,
    /// Surface height.
    pub height: u16,
}

impl RenderingInfo {
    /// Field values in schema order.
    #[must_use]
    pub fn values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::U32(self.frame),
            FieldValue::U32(self.published_tick),
            FieldValue::U16(self.width),
            FieldValue::U16(self.height),
        ]
    }

    /// Rebuilds the block from decoded values; `None` if the layout differs.
    #[must_use]
    pub fn from_values(values: &[FieldValue]) -> Option<Self> {
        match values {
            [FieldValue::U32(frame), FieldValue::U32(published_tick), FieldValue::U16(width), FieldValue::U16(height)] => {
                Some(Self {
                    frame: *frame,
                    published_tick: *published_tick,
                    width: *width,
                    height: *height,
                })
            }
            _ => None,
        }
    }
}
