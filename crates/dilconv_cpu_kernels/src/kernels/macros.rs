use core::fmt;

/// Name of a compiled kernel variant, `<op>_<dtype>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Kernel(pub &'static str);

impl Kernel {
    /// The operation part of the name, e.g. `conv3d_relu`.
    pub fn op_name(&self) -> &'static str {
        self.0.rsplit_once('_').map(|(op, _)| op).unwrap_or(self.0)
    }

    /// The dtype suffix, e.g. `f32`.
    pub fn dtype_suffix(&self) -> &'static str {
        self.0.rsplit_once('_').map(|(_, dtype)| dtype).unwrap_or("")
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kernel[{}]", self.0)
    }
}

macro_rules! ops {
    ($($name:ident),+) => {
        $(
        pub mod $name {
            use $crate::kernels::macros::Kernel;
            pub const BF16: Kernel = Kernel(concat!(stringify!($name), "_bf16"));
            pub const F16: Kernel = Kernel(concat!(stringify!($name), "_f16"));
            pub const F32: Kernel = Kernel(concat!(stringify!($name), "_f32"));
            pub const F64: Kernel = Kernel(concat!(stringify!($name), "_f64"));
        }
        )+
    };
}
pub(crate) use ops;
