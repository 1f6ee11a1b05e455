//! The layered tissue model: a stack of slabs bounded by planar interfaces,
//! with outside media above and below, and an optional embedded ellipsoid
//! whose optics live at a dedicated layer index.

// others
use smallvec::SmallVec;
// pertmc
use crate::core::pertmc::Float;
use crate::shapes::ellipsoid::Ellipsoid;

/// Optical properties of one slab. `zbegin`/`zend` are derived from the
/// cumulative stack, `albedo` from the coefficients.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub n: Float,
    pub mua: Float,
    pub mus: Float,
    pub g: Float,
    pub d: Float,
    pub albedo: Float,
    pub zbegin: Float,
    pub zend: Float,
}

impl Layer {
    pub fn outside(n: Float) -> Self {
        Layer {
            n,
            ..Layer::default()
        }
    }
    pub fn mut_total(&self) -> Float {
        self.mua + self.mus
    }
}

/// Which perturbation the banana post-processing targets. Reweighting is
/// done downstream; the mode only travels through the run metadata.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum PerturbMode {
    None,
    Ellipsoid,
    Layer,
}

impl Default for PerturbMode {
    fn default() -> Self {
        PerturbMode::None
    }
}

/// The full tissue description. Indices 0 and `num_layers + 1` are the
/// outside media, used only for Fresnel at the surfaces. When an ellipsoid
/// is present its optics are appended behind the bottom outside medium and
/// `ellipsoid_index` points at them.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TissueStack {
    pub layers: SmallVec<[Layer; 16]>,
    pub num_layers: usize,
    pub ellipsoid: Ellipsoid,
    pub ellipsoid_present: bool,
    pub ellipsoid_index: usize,
    pub ellipsoid_host: usize,
    pub perturb_mode: PerturbMode,
    pub pert_layer_z_min: Float,
    pub pert_layer_z_max: Float,
}

impl TissueStack {
    /// Builds the stack from the outside media and the tissue layers in
    /// top-down order, deriving `zbegin`/`zend` and the albedos.
    pub fn new(
        n_above: Float,
        mut tissue_layers: Vec<Layer>,
        n_below: Float,
        ellipsoid: Ellipsoid,
        ellipsoid_present: bool,
    ) -> Self {
        let num_layers = tissue_layers.len();
        let mut layers: SmallVec<[Layer; 16]> = SmallVec::new();
        layers.push(Layer::outside(n_above));
        let mut zend = 0.0;
        for layer in tissue_layers.iter_mut() {
            layer.zbegin = zend;
            layer.zend = layer.zbegin + layer.d;
            layer.albedo = layer.mus / (layer.mus + layer.mua);
            zend = layer.zend;
            layers.push(layer.clone());
        }
        layers.push(Layer::outside(n_below));

        let mut stack = TissueStack {
            layers,
            num_layers,
            ellipsoid,
            ellipsoid_present,
            ellipsoid_index: 0,
            ellipsoid_host: 0,
            perturb_mode: PerturbMode::None,
            pert_layer_z_min: 0.0,
            pert_layer_z_max: 0.0,
        };
        if ellipsoid_present {
            // the inhomogeneity shares its host layer's optics (and index,
            // so no Fresnel occurs at its surface); it still gets a layer
            // slot of its own so downstream perturbation can retarget it
            let host = stack.layer_of_z(stack.ellipsoid.center.z);
            let mut ellip_layer = stack.layers[host].clone();
            ellip_layer.d = 0.0;
            stack.layers.push(ellip_layer);
            stack.ellipsoid_index = stack.layers.len() - 1;
            stack.ellipsoid_host = host;
        }
        stack
    }

    /// Total slab thickness.
    pub fn slab_thickness(&self) -> Float {
        self.layers[self.num_layers].zend
    }

    /// Optical properties at the given layer index (which may be the
    /// ellipsoid's slot).
    pub fn properties_at(&self, curr_layer: usize) -> &Layer {
        &self.layers[curr_layer]
    }

    /// The layer whose planar interfaces bound the photon: the host layer
    /// when the photon is inside the ellipsoid, otherwise its own layer.
    pub fn geometric_layer(&self, curr_layer: usize) -> usize {
        if self.ellipsoid_present && curr_layer == self.ellipsoid_index {
            self.ellipsoid_host
        } else {
            curr_layer
        }
    }

    /// Linear search for the tissue layer containing depth `z`; a point on
    /// a shared interface belongs to the lower-indexed layer.
    pub fn layer_of_z(&self, z: Float) -> usize {
        for i in 1..=self.num_layers {
            if z >= self.layers[i].zbegin && z <= self.layers[i].zend {
                return i;
            }
        }
        if z <= 0.0 {
            1
        } else {
            self.num_layers
        }
    }

    /// Specular reflectance of the collimated source at the top surface.
    pub fn specular(&self) -> Float {
        let n_air = self.layers[0].n;
        let n_tiss = self.layers[1].n;
        (n_air - n_tiss) * (n_air - n_tiss) / ((n_air + n_tiss) * (n_air + n_tiss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(n: Float, mus: Float, mua: Float, g: Float, d: Float) -> Layer {
        Layer {
            n,
            mua,
            mus,
            g,
            d,
            ..Layer::default()
        }
    }

    fn two_layer_stack() -> TissueStack {
        TissueStack::new(
            1.0,
            vec![
                layer(1.4, 100.0, 1.0, 0.9, 0.1),
                layer(1.4, 10.0, 0.1, 0.9, 1.0),
            ],
            1.0,
            Ellipsoid::default(),
            false,
        )
    }

    #[test]
    fn stack_invariants() {
        let t = two_layer_stack();
        assert_eq!(t.layers[0].zend, 0.0);
        assert_eq!(t.layers[1].zbegin, 0.0);
        assert!((t.layers[1].zend - 0.1).abs() < 1e-15);
        assert!((t.layers[2].zbegin - 0.1).abs() < 1e-15);
        assert!((t.slab_thickness() - 1.1).abs() < 1e-15);
        assert!((t.layers[1].albedo - 100.0 / 101.0).abs() < 1e-15);
    }

    #[test]
    fn layer_lookup_resolves_ties_downward() {
        let t = two_layer_stack();
        assert_eq!(t.layer_of_z(0.05), 1);
        // shared interface belongs to the upper layer
        assert_eq!(t.layer_of_z(0.1), 1);
        assert_eq!(t.layer_of_z(0.2), 2);
        assert_eq!(t.layer_of_z(1.1), 2);
    }

    #[test]
    fn specular_for_air_tissue() {
        let t = two_layer_stack();
        // (0.4/2.4)^2
        assert!((t.specular() - 0.027_777_777_777_777_776).abs() < 1e-12);
    }

    #[test]
    fn ellipsoid_gets_its_own_layer_slot() {
        let e = Ellipsoid::new(0.0, 0.0, 0.5, 0.1, 0.1, 0.1);
        let t = TissueStack::new(
            1.0,
            vec![layer(1.4, 100.0, 1.0, 0.9, 1.0)],
            1.0,
            e,
            true,
        );
        assert!(t.ellipsoid_present);
        assert_eq!(t.ellipsoid_host, 1);
        assert_eq!(t.ellipsoid_index, 3);
        let host = t.properties_at(t.ellipsoid_host);
        let ellip = t.properties_at(t.ellipsoid_index);
        assert_eq!(host.mua, ellip.mua);
        assert_eq!(host.n, ellip.n);
        assert_eq!(t.geometric_layer(t.ellipsoid_index), 1);
        assert_eq!(t.geometric_layer(1), 1);
    }
}
