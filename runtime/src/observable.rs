use tokio::sync::watch;

/// Current-value container the render layer can read and subscribe to.
///
/// Writers replace or edit the value in place; every subscriber sees the
/// latest value, intermediate ones may be skipped.
#[derive(Debug)]
pub struct Observable<T> {
    sender: watch::Sender<T>,
}

impl<T> Observable<T> {
    pub fn new(value: T) -> Self {
        let (sender, _) = watch::channel(value);
        Self { sender }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.sender.borrow().clone()
    }

    /// Read the value without cloning it.
    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.sender.borrow())
    }

    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    pub fn update(&self, edit: impl FnOnce(&mut T)) {
        self.sender.send_modify(edit);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Wait until the value satisfies `predicate`, returning a clone of it.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&T) -> bool) -> T
    where
        T: Clone,
    {
        let mut receiver = self.subscribe();
        match receiver.wait_for(|value| predicate(value)).await {
            Ok(value) => value.clone(),
            // The sender is owned by `self`, which outlives this call.
            Err(_) => self.get(),
        }
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
