use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Engine-level buffer that survives across forward passes.
///
/// Clones share the same storage, so a recorded update reaches every holder.
pub struct Variable<B: Backend> {
    value: Arc<RwLock<Tensor<B, 2>>>,
}

impl<B: Backend> Variable<B> {
    pub fn new(value: Tensor<B, 2>) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
        }
    }

    /// Current value
    pub fn value(&self) -> Tensor<B, 2> {
        self.value.read().clone()
    }

    pub fn dims(&self) -> [usize; 2] {
        self.value.read().dims()
    }

    /// Whether both handles point at the same buffer
    pub fn same_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    fn assign(&self, value: Tensor<B, 2>) {
        *self.value.write() = value;
    }
}

impl<B: Backend> Clone for Variable<B> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<B: Backend> fmt::Debug for Variable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("dims", &self.dims())
            .finish()
    }
}

/// Writes recorded during a forward pass, applied later in one go.
pub struct StateUpdates<B: Backend> {
    pending: Vec<(Variable<B>, Tensor<B, 2>)>,
}

impl<B: Backend> StateUpdates<B> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Record that `target` should take `value`
    pub fn push(&mut self, target: Variable<B>, value: Tensor<B, 2>) {
        self.pending.push((target, value));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Variable<B>, Tensor<B, 2>)> {
        self.pending.iter()
    }

    /// Apply every recorded write
    pub fn apply(self) {
        tracing::trace!(count = self.pending.len(), "applying state updates");
        for (target, value) in self.pending {
            target.assign(value);
        }
    }
}

impl<B: Backend> Default for StateUpdates<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> fmt::Debug for StateUpdates<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateUpdates")
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_updates_are_deferred() {
        let device = Default::default();
        let var = Variable::new(Tensor::<TestBackend, 2>::zeros([2, 3], &device));

        let mut updates = StateUpdates::new();
        updates.push(var.clone(), Tensor::ones([2, 3], &device));

        // Nothing happens until the updates are applied
        assert_eq!(var.value().sum().into_scalar(), 0.0);
        assert_eq!(updates.len(), 1);

        updates.apply();
        assert_eq!(var.value().sum().into_scalar(), 6.0);
    }

    #[test]
    fn test_clones_share_storage() {
        let device = Default::default();
        let var = Variable::new(Tensor::<TestBackend, 2>::zeros([1, 1], &device));
        let alias = var.clone();
        let other = Variable::new(Tensor::<TestBackend, 2>::zeros([1, 1], &device));

        assert!(var.same_buffer(&alias));
        assert!(!var.same_buffer(&other));

        let mut updates = StateUpdates::new();
        updates.push(alias, Tensor::ones([1, 1], &device));
        updates.apply();

        assert_eq!(var.value().into_scalar(), 1.0);
    }
}
