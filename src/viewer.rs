//! Viewer-facing surface: one active scene at a time.

use crate::error::Result;
use crate::model::lifecycle::{release, ModelHandle};
use crate::model::resolver::DependencyResolver;

/// Scene shown before any model is loaded.
pub const DEFAULT_SCENE_XML: &str = r#"<mujoco model="empty">
  <option timestep="0.002"/>
  <visual>
    <headlight ambient="0.4 0.4 0.4" diffuse="0.6 0.6 0.6"/>
  </visual>
  <worldbody>
    <light pos="0 0 3" dir="0 0 -1"/>
    <geom name="floor" type="plane" size="2 2 0.05" rgba="0.8 0.8 0.8 1"/>
  </worldbody>
</mujoco>
"#;

pub const DEFAULT_SCENE_ID: &str = "default";
pub const DEFAULT_SCENE_FILE: &str = "default_scene.xml";

/// Owns the viewer's active handle.
///
/// A successful load replaces and releases the previous handle. A failed
/// load leaves the previous handle active.
pub struct SceneViewer {
    resolver: DependencyResolver,
    active: Option<ModelHandle>,
}

impl SceneViewer {
    pub fn new(resolver: DependencyResolver) -> Self {
        Self {
            resolver,
            active: None,
        }
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    pub fn active(&self) -> Option<&ModelHandle> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ModelHandle> {
        self.active.as_mut()
    }

    /// Load a model and make it the active scene.
    pub async fn load_model(
        &mut self,
        model_id: &str,
        root_path: &str,
        root_bytes: Vec<u8>,
    ) -> Result<&ModelHandle> {
        let handle = self
            .resolver
            .load_model(model_id, root_path, root_bytes)
            .await
            .inspect_err(|e| log::warn!("Load of '{}' failed: {}", model_id, e.user_message()))?;
        Ok(self.install(handle))
    }

    /// Show the built-in empty scene.
    pub async fn load_default_scene(&mut self) -> Result<&ModelHandle> {
        let handle = self
            .resolver
            .load_definition(
                DEFAULT_SCENE_ID,
                DEFAULT_SCENE_FILE,
                DEFAULT_SCENE_XML.as_bytes().to_vec(),
            )
            .await?;
        Ok(self.install(handle))
    }

    /// Release the active scene, if any.
    pub fn unload(&mut self) -> bool {
        match self.active.take() {
            Some(mut handle) => release(&mut handle),
            None => false,
        }
    }

    fn install(&mut self, handle: ModelHandle) -> &ModelHandle {
        if let Some(mut previous) = self.active.take() {
            log::debug!(
                "Replacing scene '{}' with '{}'",
                previous.model_id(),
                handle.model_id()
            );
            release(&mut previous);
        }
        self.active.insert(handle)
    }
}

impl Drop for SceneViewer {
    fn drop(&mut self) {
        self.unload();
    }
}
