//! Evaluator environment: an immutable chain of binding frames
//!
//! Frames are shared by reference. A lambda captures the environment it was
//! defined in; applying it pushes a fresh frame for the parameters without
//! cloning anything below. Since values are immutable, frames never need
//! copy-on-write.

use crate::udm::Udm;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug)]
struct Frame {
    vars: HashMap<String, Udm>,
    parent: Option<Rc<Frame>>,
}

/// A lexical environment: name → value, innermost frame first
#[derive(Debug, Clone, Default)]
pub struct Env {
    head: Option<Rc<Frame>>,
}

impl Env {
    /// The empty environment
    pub fn new() -> Self {
        Env { head: None }
    }

    /// Returns a new environment with one extra binding in a fresh frame
    pub fn bind(&self, name: impl Into<String>, value: Udm) -> Env {
        let mut vars = HashMap::with_capacity(1);
        vars.insert(name.into(), value);
        self.push_frame(vars)
    }

    /// Returns a new environment with `vars` as the innermost frame
    pub fn push_frame(&self, vars: HashMap<String, Udm>) -> Env {
        Env {
            head: Some(Rc::new(Frame {
                vars,
                parent: self.head.clone(),
            })),
        }
    }

    /// Looks a name up through the frame chain, innermost first
    pub fn lookup(&self, name: &str) -> Option<&Udm> {
        let mut frame = self.head.as_deref();
        while let Some(f) = frame {
            if let Some(value) = f.vars.get(name) {
                return Some(value);
            }
            frame = f.parent.as_deref();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frames_shadow_outer() {
        let base = Env::new().bind("x", Udm::int(1));
        let inner = base.bind("x", Udm::int(2));
        assert_eq!(inner.lookup("x"), Some(&Udm::int(2)));
        assert_eq!(base.lookup("x"), Some(&Udm::int(1)));
    }

    #[test]
    fn lookup_walks_the_chain() {
        let env = Env::new().bind("a", Udm::int(1)).bind("b", Udm::int(2));
        assert_eq!(env.lookup("a"), Some(&Udm::int(1)));
        assert!(env.lookup("missing").is_none());
    }
}
