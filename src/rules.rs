/// A conjunctive control rule: IF angle is `A` AND velocity is `V` THEN
/// force is `F`. The conjunction is evaluated as the min of the two
/// antecedent degrees.
pub struct Rule<A, V, F> {
    pub angle: A,
    pub velocity: V,
    pub force: F,
}

pub struct Rules<A, V, F>(pub(crate) Vec<Rule<A, V, F>>);

impl<A, V, F> Default for Rules<A, V, F> {
    fn default() -> Self {
        Rules::new()
    }
}

impl<A, V, F> Rules<A, V, F> {
    pub fn new() -> Self {
        Rules(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Rules(Vec::with_capacity(capacity))
    }

    pub fn add(&mut self, angle: A, velocity: V, force: F) {
        self.0.push(Rule {
            angle,
            velocity,
            force,
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Rule<A, V, F>> {
        self.0.iter()
    }
}
