//! Transfer function volumes over a spatial field.
//!
//! A `transferFunction1D` volume owns one volume shader, built once, and
//! the native volume node of its field. Committing new transfer function
//! data only rewrites node settings in the shader graph.

use anari_cycles_core::math::{Box1, Box3, Mat4, Vec3};
use anari_cycles_core::{Arena, DataType};

use crate::array::Array;
use crate::error::NativeError;
use crate::native::scene::{GeometryId, NativeScene, ShaderId};
use crate::native::shader_graph::{MathOp, NodeId, NodeKind, ShaderGraph, SocketValue};
use crate::object::{
    ArrayHandle, Object, ObjectBase, ObjectHandle, SpatialFieldHandle, warn_unknown_subtype,
};
use crate::spatial_field::SpatialField;
use crate::state::FinalizeContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    TransferFunction1D,
    Unknown,
}

/// Nodes of the transfer function graph that commits rewrite.
#[derive(Debug, Clone, Copy)]
struct TransferNodes {
    map_range: NodeId,
    ramp: NodeId,
    density: NodeId,
}

/// attribute(voxels) -> map range -> ramp -> principled volume.
fn build_transfer_graph() -> Result<(ShaderGraph, TransferNodes), NativeError> {
    let mut graph = ShaderGraph::new();
    let volume = graph.add(NodeKind::PrincipledVolume);
    let attribute = graph.add(NodeKind::Attribute {
        attribute: "voxels".to_string(),
    });
    let map_range = graph.add(NodeKind::MapRange { clamp: true });
    let ramp = graph.add(NodeKind::RgbRamp {
        ramp: Vec::new(),
        alpha: Vec::new(),
        interpolate: true,
    });
    let density = graph.add(NodeKind::Math {
        op: MathOp::Multiply,
        clamp: false,
    });

    graph.connect(volume.output("Volume"), graph.output().input("Volume"))?;
    graph.connect(attribute.output("Fac"), map_range.input("Value"))?;
    graph.connect(map_range.output("Result"), ramp.input("Fac"))?;
    graph.connect(ramp.output("Color"), volume.input("Color"))?;
    graph.connect(ramp.output("Alpha"), density.input("Value1"))?;
    graph.connect(density.output("Value"), volume.input("Density"))?;
    graph.set(density.input("Value2"), SocketValue::Float(1.0))?;

    Ok((
        graph,
        TransferNodes {
            map_range,
            ramp,
            density,
        },
    ))
}

/// Linearly resamples `values` to `n` evenly spaced stops.
fn resample<T, F>(values: &[T], n: usize, lerp: F) -> Vec<T>
where
    T: Copy,
    F: Fn(T, T, f32) -> T,
{
    if values.len() == n || values.len() < 2 {
        return values.iter().copied().cycle().take(n).collect();
    }
    let last = values.len() - 1;
    (0..n)
        .map(|i| {
            let x = if n > 1 {
                i as f32 * last as f32 / (n - 1) as f32
            } else {
                0.0
            };
            let i0 = (x.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            lerp(values[i0], values[i1], x - i0 as f32)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Volume {
    base: ObjectBase,
    kind: VolumeKind,
    field: Option<SpatialFieldHandle>,
    field_changed: bool,
    value_range: Box1,
    color: Option<ArrayHandle>,
    opacity: Option<ArrayHandle>,
    density_scale: f32,
    shader: Option<ShaderId>,
    nodes: Option<TransferNodes>,
    node: Option<GeometryId>,
}

impl Volume {
    pub fn new(subtype: &str, scene: &mut NativeScene) -> Self {
        let kind = match subtype {
            "transferFunction1D" => VolumeKind::TransferFunction1D,
            _ => {
                warn_unknown_subtype(DataType::Volume, subtype);
                VolumeKind::Unknown
            }
        };
        let (shader, nodes) = match kind {
            VolumeKind::TransferFunction1D => match build_transfer_graph() {
                Ok((graph, nodes)) => (
                    Some(scene.create_shader("ANARI transferFunction1D", graph)),
                    Some(nodes),
                ),
                Err(err) => {
                    log::error!("failed to build transferFunction1D shader: {}", err);
                    (None, None)
                }
            },
            VolumeKind::Unknown => (None, None),
        };
        Self {
            base: ObjectBase::new(DataType::Volume, subtype),
            kind,
            field: None,
            field_changed: false,
            value_range: Box1::new(0.0, 1.0),
            color: None,
            opacity: None,
            density_scale: 1.0,
            shader,
            nodes,
            node: None,
        }
    }

    pub fn kind(&self) -> VolumeKind {
        self.kind
    }

    pub fn shader(&self) -> Option<ShaderId> {
        self.shader
    }

    /// The native volume node instanced by groups.
    pub fn native_node(&self) -> Option<GeometryId> {
        self.node
    }

    pub fn field(&self) -> Option<SpatialFieldHandle> {
        self.field
    }

    pub fn is_valid(&self, fields: &Arena<SpatialField>, arrays: &Arena<Array>) -> bool {
        self.kind != VolumeKind::Unknown
            && self
                .field
                .and_then(|h| fields.get(h))
                .is_some_and(|f| f.is_valid(arrays))
            && self
                .color
                .and_then(|h| arrays.get(h))
                .is_some_and(|a| !a.is_empty())
            && self
                .opacity
                .and_then(|h| arrays.get(h))
                .is_some_and(|a| !a.is_empty())
    }

    pub fn bounds(&self, fields: &Arena<SpatialField>, arrays: &Arena<Array>) -> Box3 {
        self.field
            .and_then(|h| fields.get(h))
            .map(|f| f.bounds(arrays))
            .unwrap_or_else(Box3::empty)
    }

    /// Object-to-world transform of the native node under `xfm`.
    pub fn object_transform(&self, fields: &Arena<SpatialField>, xfm: &Mat4) -> Mat4 {
        match self.field.and_then(|h| fields.get(h)) {
            Some(field) => xfm * field.object_transform(),
            None => *xfm,
        }
    }

    pub fn finalize(
        &mut self,
        ctx: &mut FinalizeContext<'_>,
        fields: &Arena<SpatialField>,
        arrays: &Arena<Array>,
    ) {
        if self.kind == VolumeKind::Unknown {
            return;
        }
        if self.field.is_none() {
            log::warn!("no spatial field provided to transferFunction1D volume");
        } else if self.color.is_none() {
            log::warn!("no color data provided to transferFunction1D volume");
        } else if self.opacity.is_none() {
            log::warn!("no opacity data provided to transfer function");
        }

        let field = self.field.and_then(|h| fields.get(h));
        if self.field_changed {
            self.field_changed = false;
            if let Some(old) = self.node.take() {
                ctx.scene.delete_geometry(old);
            }
            self.node = field.and_then(|f| f.create_node(ctx.scene));
            let geom = self.node.and_then(|node| ctx.scene.geometry_mut(node));
            if let (Some(geom), Some(shader)) = (geom, self.shader) {
                geom.used_shaders = vec![shader];
            }
            ctx.mark_scene_changed();
        }

        if !self.is_valid(fields, arrays) {
            return;
        }
        if let Err(err) = self.update_shader(ctx.scene, arrays) {
            log::error!("failed to update transferFunction1D shader: {}", err);
        }
        if let (Some(field), Some(node)) = (field, self.node) {
            field.sync_node(ctx.scene, node, arrays);
            ctx.scene.tag_geometry_update(node);
        }
    }

    fn update_shader(&self, scene: &mut NativeScene, arrays: &Arena<Array>) -> Result<(), NativeError> {
        let (Some(shader), Some(nodes)) = (self.shader, self.nodes) else {
            return Ok(());
        };
        let Some(mut graph) = scene.shader(shader).map(|s| s.graph().clone()) else {
            return Err(NativeError::StaleHandle("shader"));
        };

        let colors: Vec<Vec3> = self
            .color
            .and_then(|h| arrays.get(h))
            .map(|a| (0..a.len()).map(|i| a.float4(i).xyz()).collect())
            .unwrap_or_default();
        let opacities: Vec<f32> = self
            .opacity
            .and_then(|h| arrays.get(h))
            .map(|a| (0..a.len()).map(|i| a.float4(i).x).collect())
            .unwrap_or_default();
        let n = colors.len().max(opacities.len());

        if let NodeKind::RgbRamp { ramp, alpha, .. } = graph.kind_mut(nodes.ramp)? {
            *ramp = resample(&colors, n, |a, b, t| a.lerp(&b, t));
            *alpha = resample(&opacities, n, |a, b, t| a + (b - a) * t);
        }
        graph.set(
            nodes.map_range.input("From Min"),
            SocketValue::Float(self.value_range.lower),
        )?;
        graph.set(
            nodes.map_range.input("From Max"),
            SocketValue::Float(self.value_range.upper),
        )?;
        graph.set(
            nodes.density.input("Value2"),
            SocketValue::Float(self.density_scale),
        )?;
        scene.set_shader_graph(shader, graph)
    }

    /// Deletes the shader and volume node from the native scene.
    pub fn release(&mut self, scene: &mut NativeScene) {
        if let Some(node) = self.node.take() {
            scene.delete_geometry(node);
        }
        if let Some(shader) = self.shader.take() {
            scene.delete_shader(shader);
        }
    }
}

impl Object for Volume {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        let field = params.get_object("value").and_then(|h| h.as_spatial_field());
        self.field_changed |= field != self.field;
        self.field = field;
        self.value_range = params.get_or("valueRange", Box1::new(0.0, 1.0));
        self.color = params.get_object("color").and_then(|h| h.as_array());
        self.opacity = params.get_object("opacity").and_then(|h| h.as_array());
        self.density_scale = params.get_or("unitDistance", 1.0);
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        let field = self.field.map(ObjectHandle::from);
        let arrays = [self.color, self.opacity].into_iter().flatten().map(ObjectHandle::from);
        field.into_iter().chain(arrays).collect()
    }

    fn is_unknown(&self) -> bool {
        self.kind == VolumeKind::Unknown
    }
}
