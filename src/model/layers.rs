//! Layer helpers shared by the generator and discriminator

use tch::{nn, Tensor};

/// Standard deviation of the normal weight initialization
pub const INIT_STDDEV: f64 = 0.02;

fn weight_init() -> nn::Init {
    nn::Init::Randn {
        mean: 0.0,
        stdev: INIT_STDDEV,
    }
}

/// 2D convolution with N(0, 0.02) weights and zero bias
pub fn conv2d<'a, P: std::borrow::Borrow<nn::Path<'a>>>(
    p: P,
    c_in: i64,
    c_out: i64,
    kernel: i64,
    stride: i64,
    padding: i64,
) -> nn::Conv2D {
    let cfg = nn::ConvConfig {
        stride,
        padding,
        ws_init: weight_init(),
        bs_init: nn::Init::Const(0.0),
        ..Default::default()
    };
    nn::conv2d(p, c_in, c_out, kernel, cfg)
}

/// Stride-2 transposed convolution that exactly doubles the spatial size
/// (kernel 3, padding 1, output padding 1)
pub fn upconv2d<'a, P: std::borrow::Borrow<nn::Path<'a>>>(
    p: P,
    c_in: i64,
    c_out: i64,
) -> nn::ConvTranspose2D {
    let cfg = nn::ConvTransposeConfig {
        stride: 2,
        padding: 1,
        output_padding: 1,
        ws_init: weight_init(),
        bs_init: nn::Init::Const(0.0),
        ..Default::default()
    };
    nn::conv_transpose2d(p, c_in, c_out, 3, cfg)
}

/// Instance normalization without affine parameters or running statistics
pub fn instance_norm(xs: &Tensor) -> Tensor {
    xs.instance_norm::<Tensor>(None, None, None, None, true, 0.1, 1e-5, false)
}

/// Leaky ReLU with a negative slope of 0.2
pub fn leaky_relu(xs: &Tensor) -> Tensor {
    xs.maximum(&(xs * 0.2))
}
