use crate::element::Props;
use crate::error::HostError;

/// Opaque identifier for one host instance, minted by the adapter. The fiber
/// occupying the corresponding tree slot is the handle's sole owner; an
/// update that reuses the instance transfers the handle to the new fiber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostHandle(pub u64);

/// Primitive mutation surface of the render target.
///
/// This is a contract only: the engine never assumes anything about what a
/// handle points at. All methods are invoked from the commit phase (and
/// instance creation from the render phase), strictly single-threaded.
pub trait HostAdapter {
    fn create_instance(&mut self, tag: &str) -> Result<HostHandle, HostError>;

    fn create_text_instance(&mut self, value: &str) -> Result<HostHandle, HostError>;

    /// Apply the attribute/listener delta between `old` and `new` to an
    /// existing instance. See [`crate::element::diff_props`].
    fn update_instance(
        &mut self,
        handle: HostHandle,
        old: &Props,
        new: &Props,
    ) -> Result<(), HostError>;

    fn append_child(&mut self, parent: HostHandle, child: HostHandle) -> Result<(), HostError>;

    fn remove_child(&mut self, parent: HostHandle, child: HostHandle) -> Result<(), HostError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{HostAdapter, HostHandle};
    use crate::element::{Props, diff_props};
    use crate::error::HostError;

    /// Recorded invocation of one host primitive.
    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum HostCall {
        Create { handle: HostHandle, tag: String },
        CreateText { handle: HostHandle, value: String },
        Update { handle: HostHandle, text_value: Option<String> },
        Append { parent: HostHandle, child: HostHandle },
        Remove { parent: HostHandle, child: HostHandle },
    }

    /// Recording adapter. Mints sequential handles and logs every call so
    /// tests can assert on exact call order and granularity.
    #[derive(Default)]
    pub(crate) struct TestHost {
        next_handle: u64,
        pub calls: Vec<HostCall>,
        pub fail_creates: bool,
        pub fail_updates: bool,
    }

    impl TestHost {
        pub fn container(&mut self) -> HostHandle {
            self.mint()
        }

        fn mint(&mut self) -> HostHandle {
            let handle = HostHandle(self.next_handle);
            self.next_handle += 1;
            handle
        }

        pub fn take_calls(&mut self) -> Vec<HostCall> {
            std::mem::take(&mut self.calls)
        }

        pub fn updates(&self) -> Vec<&HostCall> {
            self.calls
                .iter()
                .filter(|call| matches!(call, HostCall::Update { .. }))
                .collect()
        }
    }

    impl HostAdapter for TestHost {
        fn create_instance(&mut self, tag: &str) -> Result<HostHandle, HostError> {
            if self.fail_creates {
                return Err(HostError::new(format!("create_instance({tag}) refused")));
            }
            let handle = self.mint();
            self.calls.push(HostCall::Create { handle, tag: tag.to_string() });
            Ok(handle)
        }

        fn create_text_instance(&mut self, value: &str) -> Result<HostHandle, HostError> {
            if self.fail_creates {
                return Err(HostError::new("create_text_instance refused"));
            }
            let handle = self.mint();
            self.calls.push(HostCall::CreateText { handle, value: value.to_string() });
            Ok(handle)
        }

        fn update_instance(
            &mut self,
            handle: HostHandle,
            old: &Props,
            new: &Props,
        ) -> Result<(), HostError> {
            debug_assert!(
                !diff_props(old, new).is_empty(),
                "commit must skip updates with an empty prop diff"
            );
            if self.fail_updates {
                return Err(HostError::new("update_instance refused"));
            }
            let text_value = new
                .attrs
                .get(crate::element::TEXT_VALUE_ATTR)
                .and_then(|value| value.as_str())
                .map(str::to_string);
            self.calls.push(HostCall::Update { handle, text_value });
            Ok(())
        }

        fn append_child(
            &mut self,
            parent: HostHandle,
            child: HostHandle,
        ) -> Result<(), HostError> {
            self.calls.push(HostCall::Append { parent, child });
            Ok(())
        }

        fn remove_child(
            &mut self,
            parent: HostHandle,
            child: HostHandle,
        ) -> Result<(), HostError> {
            self.calls.push(HostCall::Remove { parent, child });
            Ok(())
        }
    }
}
