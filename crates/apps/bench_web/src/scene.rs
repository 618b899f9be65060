use std::cell::RefCell;
use std::rc::Rc;

use params::ParamValue;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Geometry {
    Points,
    Lines,
    Polygons,
}

impl Geometry {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "points" => Some(Geometry::Points),
            "lines" => Some(Geometry::Lines),
            "polygons" => Some(Geometry::Polygons),
            _ => None,
        }
    }
}

/// Sample-feature settings every backend draws from.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub count: u32,
    pub geometry: Geometry,
    pub animate: bool,
    /// Bumped by the regenerate action.
    pub seed: u64,
}

pub type SharedScene = Rc<RefCell<Scene>>;

impl Default for Scene {
    fn default() -> Self {
        Self {
            count: 1000,
            geometry: Geometry::Points,
            animate: true,
            seed: 1,
        }
    }
}

impl Scene {
    /// Applies a parameter value by id. Ids the scene does not know are
    /// ignored and reported as `false`.
    pub fn apply(&mut self, id: &str, value: &ParamValue) -> bool {
        match (id, value) {
            ("count", ParamValue::Number(n)) => self.count = n.max(0.0) as u32,
            ("geometry", ParamValue::Text(t)) => match Geometry::from_token(t) {
                Some(g) => self.geometry = g,
                None => return false,
            },
            ("animate", ParamValue::Bool(b)) => self.animate = *b,
            ("regenerate", ParamValue::Trigger) => self.seed = self.seed.wrapping_add(1),
            _ => return false,
        }
        true
    }

    /// Feature anchors in unit space, deterministic for a given seed and
    /// frame.
    pub fn anchors(&self, frame_index: u64) -> impl Iterator<Item = [f32; 2]> + '_ {
        let drift = if self.animate {
            (frame_index % 600) as f32 / 600.0
        } else {
            0.0
        };
        let mut state = self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        (0..self.count).map(move |_| {
            let x = next_unit(&mut state);
            let y = next_unit(&mut state);
            [(x + drift).fract(), y]
        })
    }
}

// xorshift64*
fn next_unit(state: &mut u64) -> f32 {
    let mut x = *state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    *state = x;
    let r = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
    (r >> 40) as f32 / (1u64 << 24) as f32
}
