//! # Built-in Scene Proxies
//!
//! Mirrors of the `SceneNode` and `Camera` classes. Both read their whole
//! slot once per tick, so every matrix is built from a single publish.
//!
//! Matrices are column-major `[[f32; 4]; 4]` (`m[column][row]`), the layout
//! GPU uniform buffers expect.

use bytemuck::{Pod, Zeroable};
use mirage_core::{FieldValue, ProxyId, Schema};
use mirage_shared::scene::{POSITION, ROTATION, SCALE};
use mirage_shared::{RpcValue, Transform};

use crate::proxy::{ProxyCore, RenderProxy, RpcOutcome};
use crate::registry::{ProxyRegistry, Resolution};

/// Column-major 4x4 matrix.
pub type Mat4 = [[f32; 4]; 4];

/// Identity matrix.
pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Largest pitch the camera accepts, just short of straight up or down.
const MAX_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// Per-node uniform (80 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NodeUniform {
    /// World transform.
    pub world: Mat4,
    /// 1 if the node is drawn.
    pub visible: u32,
    /// Padding to 16-byte alignment.
    pub _pad: [u32; 3],
}

/// Per-camera uniform (96 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// Projection times view.
    pub view_proj: Mat4,
    /// Eye position (w = 1).
    pub eye: [f32; 4],
    /// Exposure multiplier set over RPC.
    pub exposure: f32,
    /// 1 if this camera drives the viewport.
    pub active: u32,
    /// Padding to 16-byte alignment.
    pub _pad: [u32; 2],
}

/// Mirror of a `SceneNode`: transform, visibility, parent.
#[derive(Debug)]
pub struct SceneNodeProxy {
    core: ProxyCore,
    world: Mat4,
    uniform: NodeUniform,
    waiting_for: Option<ProxyId>,
}

impl SceneNodeProxy {
    /// Constructor name in create-proxy instructions.
    pub const CONSTRUCTOR: &'static str = "SceneNodeProxy";

    /// Wraps a core bound to a `SceneNode` buffer.
    #[must_use]
    pub fn new(core: ProxyCore) -> Self {
        Self {
            core,
            world: IDENTITY,
            uniform: NodeUniform::zeroed(),
            waiting_for: None,
        }
    }

    /// [`SceneNodeProxy::new`], boxed for the factory.
    #[must_use]
    pub fn boxed(core: ProxyCore) -> Box<dyn RenderProxy> {
        Box::new(Self::new(core))
    }

    /// Transform as of the latest publish.
    #[must_use]
    pub fn transform(&self) -> Transform {
        self.core
            .values()
            .map(|values| read_transform(self.core.schema(), &values))
            .unwrap_or_default()
    }

    /// World matrix computed on the last tick.
    #[must_use]
    pub fn world(&self) -> Mat4 {
        self.world
    }

    /// Uniform computed on the last tick.
    #[must_use]
    pub fn uniform(&self) -> &NodeUniform {
        &self.uniform
    }

    /// Uniform bytes ready for upload.
    #[must_use]
    pub fn uniform_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.uniform)
    }

    /// Parent id that did not resolve on the last tick.
    #[must_use]
    pub fn waiting_for(&self) -> Option<ProxyId> {
        self.waiting_for
    }
}

impl RenderProxy for SceneNodeProxy {
    fn core(&self) -> &ProxyCore {
        &self.core
    }

    fn tick(&mut self, _time: f32, proxies: &ProxyRegistry) {
        let Ok(values) = self.core.values() else {
            return;
        };
        let schema = self.core.schema();
        let local = compose(&read_transform(schema, &values));
        let visible = value(schema, &values, "visible")
            .and_then(FieldValue::as_bool)
            .unwrap_or(false);
        let parent = value(schema, &values, "parent")
            .and_then(FieldValue::as_ref_id)
            .unwrap_or(ProxyId::NONE);

        self.waiting_for = None;
        self.world = match proxies.resolve(parent) {
            Resolution::Null => local,
            Resolution::Unresolved(id) => {
                self.waiting_for = Some(id);
                local
            }
            Resolution::Resolved(proxy) => proxy
                .world_matrix()
                .map_or(local, |parent| multiply(&parent, &local)),
        };
        self.uniform = NodeUniform {
            world: self.world,
            visible: u32::from(visible),
            _pad: [0; 3],
        };
    }

    fn world_matrix(&self) -> Option<Mat4> {
        Some(self.world)
    }
}

/// Mirror of a `Camera`: projection parameters plus a consumer-side exposure.
#[derive(Debug)]
pub struct CameraProxy {
    core: ProxyCore,
    aspect: f32,
    exposure: f32,
    uniform: CameraUniform,
}

impl CameraProxy {
    /// Constructor name in create-proxy instructions.
    pub const CONSTRUCTOR: &'static str = "CameraProxy";

    /// Wraps a core bound to a `Camera` buffer.
    #[must_use]
    pub fn new(core: ProxyCore) -> Self {
        Self {
            core,
            aspect: 16.0 / 9.0,
            exposure: 1.0,
            uniform: CameraUniform::zeroed(),
        }
    }

    /// [`CameraProxy::new`], boxed for the factory.
    #[must_use]
    pub fn boxed(core: ProxyCore) -> Box<dyn RenderProxy> {
        Box::new(Self::new(core))
    }

    /// Width over height of the viewport.
    #[must_use]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Current exposure.
    #[must_use]
    pub fn exposure(&self) -> f32 {
        self.exposure
    }

    /// Uniform computed on the last tick.
    #[must_use]
    pub fn uniform(&self) -> &CameraUniform {
        &self.uniform
    }

    /// Uniform bytes ready for upload.
    #[must_use]
    pub fn uniform_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.uniform)
    }
}

impl RenderProxy for CameraProxy {
    fn core(&self) -> &ProxyCore {
        &self.core
    }

    fn tick(&mut self, _time: f32, _proxies: &ProxyRegistry) {
        let Ok(values) = self.core.values() else {
            return;
        };
        let schema = self.core.schema();
        let read = |name: &str| {
            value(schema, &values, name)
                .and_then(FieldValue::as_f32)
                .unwrap_or(0.0)
        };
        let eye = [read(POSITION[0]), read(POSITION[1]), read(POSITION[2])];
        let view = look_to(eye, read("yaw"), read("pitch"));
        let projection = perspective(read("fov_y"), self.aspect, read("near"), read("far"));
        let active = value(schema, &values, "active")
            .and_then(FieldValue::as_bool)
            .unwrap_or(false);

        self.uniform = CameraUniform {
            view_proj: multiply(&projection, &view),
            eye: [eye[0], eye[1], eye[2], 1.0],
            exposure: self.exposure,
            active: u32::from(active),
            _pad: [0; 2],
        };
    }

    fn call(&mut self, name: &str, params: &[RpcValue]) -> RpcOutcome {
        match name {
            "set_exposure" => match params.first().and_then(RpcValue::as_f32) {
                Some(exposure) if exposure.is_finite() && exposure > 0.0 => {
                    self.exposure = exposure;
                    self.uniform.exposure = exposure;
                    RpcOutcome::Handled
                }
                _ => RpcOutcome::InvalidParams("set_exposure takes one positive f32".into()),
            },
            _ => RpcOutcome::UnknownMethod,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }
}

fn value<'a>(schema: &Schema, values: &'a [FieldValue], name: &str) -> Option<&'a FieldValue> {
    values.get(schema.field_index(name)?)
}

fn read_transform(schema: &Schema, values: &[FieldValue]) -> Transform {
    let mut transform = Transform::IDENTITY;
    let targets = transform
        .position
        .iter_mut()
        .zip(POSITION)
        .chain(transform.rotation.iter_mut().zip(ROTATION))
        .chain(transform.scale.iter_mut().zip(SCALE));
    for (target, name) in targets {
        if let Some(v) = value(schema, values, name).and_then(FieldValue::as_f32) {
            *target = v;
        }
    }
    transform
}

/// Translation * rotation * scale.
#[must_use]
pub fn compose(transform: &Transform) -> Mat4 {
    let [x, y, z, w] = transform.rotation;
    let [sx, sy, sz] = transform.scale;
    let [px, py, pz] = transform.position;
    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, xz, yz) = (x * y, x * z, y * z);
    let (wx, wy, wz) = (w * x, w * y, w * z);

    [
        [(1.0 - 2.0 * (yy + zz)) * sx, 2.0 * (xy + wz) * sx, 2.0 * (xz - wy) * sx, 0.0],
        [2.0 * (xy - wz) * sy, (1.0 - 2.0 * (xx + zz)) * sy, 2.0 * (yz + wx) * sy, 0.0],
        [2.0 * (xz + wy) * sz, 2.0 * (yz - wx) * sz, (1.0 - 2.0 * (xx + yy)) * sz, 0.0],
        [px, py, pz, 1.0],
    ]
}

/// `a * b`.
#[must_use]
pub fn multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for (column, out_column) in out.iter_mut().enumerate() {
        for (row, cell) in out_column.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[k][row] * b[column][k]).sum();
        }
    }
    out
}

/// Right-handed perspective with depth in `[0, 1]`.
///
/// Degenerate parameters (zero fov, `far <= near`) give the identity.
#[must_use]
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    if fov_y <= 0.0 || aspect <= 0.0 || near <= 0.0 || far <= near {
        return IDENTITY;
    }
    let f = 1.0 / (fov_y * 0.5).tan();
    let range = near - far;
    [
        [f / aspect, 0.0, 0.0, 0.0],
        [0.0, f, 0.0, 0.0],
        [0.0, 0.0, far / range, -1.0],
        [0.0, 0.0, near * far / range, 0.0],
    ]
}

/// View matrix looking from `eye` along yaw/pitch (radians, yaw 0 = -Z).
#[must_use]
pub fn look_to(eye: [f32; 3], yaw: f32, pitch: f32) -> Mat4 {
    let pitch = pitch.clamp(-MAX_PITCH, MAX_PITCH);
    let f = [pitch.cos() * yaw.sin(), pitch.sin(), -pitch.cos() * yaw.cos()];
    let s = normalize(cross(f, [0.0, 1.0, 0.0]));
    let u = cross(s, f);
    [
        [s[0], u[0], -f[0], 0.0],
        [s[1], u[1], -f[1], 0.0],
        [s[2], u[2], -f[2], 0.0],
        [-dot(s, eye), -dot(u, eye), dot(f, eye), 1.0],
    ]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = dot(v, v).sqrt();
    if len <= f32::EPSILON {
        return v;
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_core::{encode_values, TripleBuffer, TripleBufferWriter};
    use mirage_shared::scene::{camera_schema, scene_node_schema};
    use std::sync::Arc;

    fn bind(raw: u32, schema: Schema) -> (TripleBufferWriter, ProxyCore) {
        let schema = Arc::new(schema);
        let (writer, handle) = TripleBuffer::create(schema.byte_len());
        let core = ProxyCore::new(ProxyId::new(raw), schema, handle, None).unwrap();
        (writer, core)
    }

    fn publish(writer: &mut TripleBufferWriter, schema: &Schema, fields: &[(&str, FieldValue)]) {
        let mut values = schema.default_values();
        for (name, value) in fields {
            values[schema.field_index(name).unwrap()] = value.clone();
        }
        let mut slot = vec![0u8; schema.byte_len()];
        encode_values(schema.fields(), &values, &mut slot).unwrap();
        writer.copy_to_write_buffer(&slot).unwrap();
    }

    fn node_fields(position: [f32; 3], parent: ProxyId) -> Vec<(&'static str, FieldValue)> {
        let mut fields = Transform::from_position(position).fields();
        fields.push(("visible", FieldValue::Bool(true)));
        fields.push(("parent", FieldValue::Ref(parent)));
        fields
    }

    #[test]
    fn test_compose_translation_and_scale() {
        let transform = Transform {
            position: [1.0, 2.0, 3.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [2.0, 2.0, 2.0],
        };
        let m = compose(&transform);
        assert_eq!(m[0][0], 2.0);
        assert_eq!(m[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(multiply(&IDENTITY, &m), m);
    }

    #[test]
    fn test_child_inherits_parent_translation() {
        let schema = scene_node_schema().unwrap();
        let (mut parent_writer, parent) = bind(1, schema.clone());
        let (mut child_writer, child) = bind(2, schema.clone());
        publish(&mut parent_writer, &schema, &node_fields([1.0, 0.0, 0.0], ProxyId::NONE));
        publish(&mut child_writer, &schema, &node_fields([0.0, 2.0, 0.0], ProxyId::new(1)));

        let mut registry = ProxyRegistry::new();
        registry.insert(SceneNodeProxy::boxed(parent));
        registry.insert(SceneNodeProxy::boxed(child));
        registry.tick_all(0.0);

        let world = registry.get(ProxyId::new(2)).unwrap().world_matrix().unwrap();
        assert_eq!(world[3], [1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unresolved_parent_falls_back_to_local() {
        let schema = scene_node_schema().unwrap();
        let (mut writer, core) = bind(2, schema.clone());
        publish(&mut writer, &schema, &node_fields([0.0, 2.0, 0.0], ProxyId::new(7)));

        let mut node = SceneNodeProxy::new(core);
        node.tick(0.0, &ProxyRegistry::new());
        assert_eq!(node.waiting_for(), Some(ProxyId::new(7)));
        assert_eq!(node.world()[3], [0.0, 2.0, 0.0, 1.0]);
        assert_eq!(node.uniform().visible, 1);
        assert_eq!(node.uniform_bytes().len(), 80);
        assert_eq!(node.transform().position, [0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_camera_rpc_and_resize() {
        let schema = camera_schema().unwrap();
        let (mut writer, core) = bind(3, schema.clone());
        publish(
            &mut writer,
            &schema,
            &[
                ("fov_y", FieldValue::F32(std::f32::consts::FRAC_PI_2)),
                ("near", FieldValue::F32(0.1)),
                ("far", FieldValue::F32(100.0)),
                ("active", FieldValue::Bool(true)),
            ],
        );

        let mut camera = CameraProxy::new(core);
        assert_eq!(
            camera.call("set_exposure", &[RpcValue::F32(2.0)]),
            RpcOutcome::Handled
        );
        assert!(matches!(
            camera.call("set_exposure", &[RpcValue::Str("bright".into())]),
            RpcOutcome::InvalidParams(_)
        ));
        assert_eq!(camera.call("zoom", &[]), RpcOutcome::UnknownMethod);

        camera.resize(200, 100);
        camera.tick(0.0, &ProxyRegistry::new());
        let uniform = camera.uniform();
        assert_eq!(uniform.exposure, 2.0);
        assert_eq!(uniform.active, 1);
        // tan(45deg) == 1, so the x scale is 1 / aspect.
        assert!((uniform.view_proj[0][0] - 0.5).abs() < 1e-5);
        assert_eq!(camera.uniform_bytes().len(), 96);
    }

    #[test]
    fn test_degenerate_projection_is_identity() {
        assert_eq!(perspective(0.0, 1.0, 0.1, 10.0), IDENTITY);
        assert_eq!(perspective(1.0, 1.0, 1.0, 1.0), IDENTITY);
    }
}
