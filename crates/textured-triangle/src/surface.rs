use eyre::bail;
use eyre::eyre;
use tracing::info;

use crate::backend::GpuBackend;
use crate::backend::Viewport;
use crate::error::SampleResult;
use crate::sync_gate::SynchronizationGate;

/// A presentation image together with its persistent render-target view.
#[derive(Debug)]
pub struct SurfaceImage<I, V> {
    pub image: I,
    pub view: V,
}

/// The rotating set of images the presentation engine consumes.
///
/// View handles are assigned once when the surface is created; the images
/// behind them are dropped and recreated as a set on every
/// [`configure`](Self::configure).
pub struct PresentationSurface<I, V, const N: usize> {
    views: [V; N],
    images: Option<[SurfaceImage<I, V>; N]>,
    extent: Option<Viewport>,
}

impl<I, V: Copy, const N: usize> PresentationSurface<I, V, N> {
    pub fn new<B>(backend: &B) -> Self
    where
        B: GpuBackend<Image = I, View = V>,
    {
        Self {
            views: array_init::array_init(|index| backend.view_handle(index)),
            images: None,
            extent: None,
        }
    }

    pub fn views(&self) -> &[V; N] {
        &self.views
    }

    pub fn is_configured(&self) -> bool {
        self.images.is_some()
    }

    pub fn extent(&self) -> Option<Viewport> {
        self.extent
    }

    pub fn viewport(&self) -> SampleResult<Viewport> {
        self.extent
            .ok_or_else(|| eyre!("presentation surface has not been configured"))
    }

    pub fn image(&self, index: usize) -> SampleResult<&SurfaceImage<I, V>> {
        let images = self
            .images
            .as_ref()
            .ok_or_else(|| eyre!("presentation surface has not been configured"))?;
        images
            .get(index)
            .ok_or_else(|| eyre!("surface image {index} out of range (surface holds {N})"))
    }

    pub fn images(&self) -> impl Iterator<Item = &SurfaceImage<I, V>> {
        self.images.iter().flatten()
    }

    /// Drains in-flight work, drops the current images and recreates all `N`
    /// of them at `width` x `height`, rebinding each persistent view.
    pub fn configure<B>(
        &mut self,
        width: u32,
        height: u32,
        gate: &SynchronizationGate,
        backend: &mut B,
    ) -> SampleResult<()>
    where
        B: GpuBackend<Image = I, View = V>,
    {
        if width == 0 || height == 0 {
            bail!("cannot configure a {width}x{height} presentation surface");
        }

        gate.drain(backend)?;

        self.images = None;
        self.extent = None;
        backend.release_surface();
        backend.recreate_surface(width, height)?;

        let views = self.views;
        let images = array_init::try_array_init(|index| -> SampleResult<_> {
            let image = backend.surface_image(index)?;
            backend.bind_view(&image, views[index]);
            Ok(SurfaceImage {
                image,
                view: views[index],
            })
        })?;

        self.images = Some(images);
        self.extent = Some(Viewport { width, height });
        info!(width, height, images = N, "presentation surface configured");
        Ok(())
    }

    pub fn current_image_index<B>(&self, backend: &B) -> usize
    where
        B: GpuBackend<Image = I, View = V>,
    {
        backend.current_image_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use crate::headless::HeadlessImage;
    use crate::headless::HeadlessView;

    type Surface = PresentationSurface<HeadlessImage, HeadlessView, 3>;

    #[test]
    fn configure_creates_every_image_with_distinct_views() {
        let mut backend = HeadlessBackend::new();
        let gate = SynchronizationGate::default();
        let mut surface = Surface::new(&backend);

        surface.configure(800, 600, &gate, &mut backend).unwrap();

        let views: Vec<_> = surface.images().map(|image| image.view).collect();
        assert_eq!(views.len(), 3);
        for (i, a) in views.iter().enumerate() {
            for b in &views[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(surface.images().all(|image| image.image.width() == 800));
    }

    #[test]
    fn views_are_stable_across_resizes() {
        let mut backend = HeadlessBackend::new();
        let gate = SynchronizationGate::default();
        let mut surface = Surface::new(&backend);

        surface.configure(800, 600, &gate, &mut backend).unwrap();
        let before: Vec<_> = surface.images().map(|image| image.view).collect();
        let generation = surface.image(0).unwrap().image.generation();

        surface.configure(1024, 768, &gate, &mut backend).unwrap();
        let after: Vec<_> = surface.images().map(|image| image.view).collect();

        assert_eq!(before, after);
        assert_eq!(&after[..], &surface.views()[..]);
        assert!(surface.image(0).unwrap().image.generation() > generation);
        assert_eq!(
            surface.viewport().unwrap(),
            Viewport {
                width: 1024,
                height: 768
            }
        );
    }

    #[test]
    fn same_size_still_recreates() {
        let mut backend = HeadlessBackend::new();
        let gate = SynchronizationGate::default();
        let mut surface = Surface::new(&backend);

        surface.configure(640, 480, &gate, &mut backend).unwrap();
        let generation = surface.image(1).unwrap().image.generation();
        surface.configure(640, 480, &gate, &mut backend).unwrap();
        assert_ne!(surface.image(1).unwrap().image.generation(), generation);
    }

    #[test]
    fn zero_extent_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let gate = SynchronizationGate::default();
        let mut surface = Surface::new(&backend);

        assert!(surface.configure(0, 600, &gate, &mut backend).is_err());
        assert!(!surface.is_configured());
        assert!(surface.viewport().is_err());
    }
}
