// ============================================================
// Layer 5 - Multi-Scale STFT Discriminator
// ============================================================
// One sub-discriminator per STFT resolution. Each one sees the
// complex spectrogram with real and imaginary parts stacked as
// channels, laid out [batch, 2 * channels, frames, freqs]:
//
//   conv (3×9)
//   conv (3×9) stride (1,2) dilation (1,1)
//   conv (3×9) stride (1,2) dilation (2,1)
//   conv (3×9) stride (1,2) dilation (4,1)
//   conv (3×3)
//   conv_post (3×3) → logits
//
// Every hidden conv is followed by leaky_relu(0.2) and its
// activation is kept as a feature map for feature matching.
//
// Losses (hinge GAN, summed over scales):
//   dis = mean(relu(1 - D(real))) + mean(relu(1 + D(fake)))
//   adv = -mean(D(fake))
//   fm  = mean over layers of mean |F(real) - F(fake)|

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{leaky_relu, relu},
};

use crate::ml::stft::Stft;

const LEAKY_SLOPE: f64 = 0.2;

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    #[config(default = 64)]
    pub filters:      usize,
    #[config(default = 2)]
    pub in_channels:  usize,
    #[config(default = 1)]
    pub out_channels: usize,
    pub n_ffts:       Vec<usize>,
    pub hop_lengths:  Vec<usize>,
    pub win_lengths:  Vec<usize>,
}

impl DiscriminatorConfig {
    /// One scale per FFT size with a full-length window and hop = n_fft / 4.
    pub fn from_fft_sizes(n_ffts: Vec<usize>, in_channels: usize) -> Self {
        let hops = n_ffts.iter().map(|&n| (n / 4).max(1)).collect();
        Self::new(n_ffts.clone(), hops, n_ffts).with_in_channels(in_channels)
    }

    /// Shortest clip every scale can analyse: the largest FFT size.
    pub fn min_samples(&self) -> usize {
        self.n_ffts.iter().copied().max().unwrap_or(0)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> EncodecDiscriminator<B> {
        let scales = self
            .n_ffts
            .iter()
            .zip(&self.hop_lengths)
            .zip(&self.win_lengths)
            .map(|((&n_fft, &hop), &win)| self.init_scale(n_fft, hop, win, device))
            .collect();
        EncodecDiscriminator { scales }
    }

    fn init_scale<B: Backend>(
        &self,
        n_fft:  usize,
        hop:    usize,
        win:    usize,
        device: &B::Device,
    ) -> StftDiscriminator<B> {
        let f = self.filters;
        let spec_channels = 2 * self.in_channels;

        let mut convs = vec![Conv2dConfig::new([spec_channels, f], [3, 9])
            .with_padding(PaddingConfig2d::Explicit(1, 4))
            .init(device)];
        for dilation in [1, 2, 4] {
            convs.push(
                Conv2dConfig::new([f, f], [3, 9])
                    .with_stride([1, 2])
                    .with_dilation([dilation, 1])
                    .with_padding(PaddingConfig2d::Explicit(dilation, 4))
                    .init(device),
            );
        }
        convs.push(
            Conv2dConfig::new([f, f], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
        );

        let conv_post = Conv2dConfig::new([f, self.out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        StftDiscriminator { convs, conv_post, stft: Stft::new(n_fft, hop, win, device) }
    }
}

#[derive(Module, Debug)]
pub struct StftDiscriminator<B: Backend> {
    pub convs:     Vec<Conv2d<B>>,
    pub conv_post: Conv2d<B>,
    pub stft:      Stft<B>,
}

impl<B: Backend> StftDiscriminator<B> {
    /// x: [batch, channels, samples] → (logits, feature maps)
    pub fn forward(&self, x: Tensor<B, 3>) -> (Tensor<B, 4>, Vec<Tensor<B, 4>>) {
        let [batch, channels, samples] = x.dims();
        let (re, im) = self.stft.forward(x.reshape([batch * channels, samples]));
        let [_, freqs, frames] = re.dims();
        let spec = Tensor::cat(
            vec![
                re.reshape([batch, channels, freqs, frames]),
                im.reshape([batch, channels, freqs, frames]),
            ],
            1,
        )
        .swap_dims(2, 3);

        let mut z = spec;
        let mut fmap = Vec::with_capacity(self.convs.len());
        for conv in &self.convs {
            z = leaky_relu(conv.forward(z), LEAKY_SLOPE);
            fmap.push(z.clone());
        }
        (self.conv_post.forward(z), fmap)
    }
}

/// Outputs of [`EncodecDiscriminator::loss`]; logits are per scale.
#[derive(Debug, Clone)]
pub struct DiscriminatorLosses<B: Backend> {
    pub dis:              Tensor<B, 1>,
    pub adv:              Tensor<B, 1>,
    pub feature_matching: Tensor<B, 1>,
    pub logits_real:      Vec<Tensor<B, 4>>,
    pub logits_fake:      Vec<Tensor<B, 4>>,
}

#[derive(Module, Debug)]
pub struct EncodecDiscriminator<B: Backend> {
    pub scales: Vec<StftDiscriminator<B>>,
}

impl<B: Backend> EncodecDiscriminator<B> {
    pub fn loss(&self, reals: Tensor<B, 3>, fakes: Tensor<B, 3>) -> DiscriminatorLosses<B> {
        let device = reals.device();
        let [batch, _, _] = reals.dims();

        // Reals and fakes share one pass per scale; the batch is split afterwards
        let both = Tensor::cat(vec![reals, fakes], 0);

        let mut dis = Tensor::<B, 1>::zeros([1], &device);
        let mut adv = Tensor::<B, 1>::zeros([1], &device);
        let mut feature_matching = Tensor::<B, 1>::zeros([1], &device);
        let mut logits_real = Vec::with_capacity(self.scales.len());
        let mut logits_fake = Vec::with_capacity(self.scales.len());

        for scale in &self.scales {
            let (logits, fmap) = scale.forward(both.clone());
            let (real, fake) = split_batch(logits, batch);

            dis = dis
                + relu(real.clone().neg().add_scalar(1.0)).mean()
                + relu(fake.clone().add_scalar(1.0)).mean();
            adv = adv - fake.clone().mean();

            let layers = fmap.len().max(1) as f64;
            let mut scale_fm = Tensor::<B, 1>::zeros([1], &device);
            for feat in fmap {
                let (f_real, f_fake) = split_batch(feat, batch);
                scale_fm = scale_fm + (f_real - f_fake).abs().mean();
            }
            feature_matching = feature_matching + scale_fm.div_scalar(layers);

            logits_real.push(real);
            logits_fake.push(fake);
        }

        DiscriminatorLosses { dis, adv, feature_matching, logits_real, logits_fake }
    }
}

fn split_batch<B: Backend>(x: Tensor<B, 4>, first: usize) -> (Tensor<B, 4>, Tensor<B, 4>) {
    let [total, c, h, w] = x.dims();
    let a = x.clone().slice([0..first, 0..c, 0..h, 0..w]);
    let b = x.slice([first..total, 0..c, 0..h, 0..w]);
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TB = NdArray;

    fn tiny() -> DiscriminatorConfig {
        DiscriminatorConfig::new(vec![64, 32], vec![16, 8], vec![64, 32])
            .with_filters(4)
            .with_in_channels(2)
    }

    fn scalar(t: Tensor<TB, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_scales_from_fft_sizes() {
        let cfg = DiscriminatorConfig::from_fft_sizes(vec![2048, 1024, 512, 256, 128], 2);
        assert_eq!(cfg.filters, 64);
        assert_eq!(cfg.out_channels, 1);
        assert_eq!(cfg.hop_lengths, vec![512, 256, 128, 64, 32]);
        assert_eq!(cfg.win_lengths, cfg.n_ffts);
        assert_eq!(cfg.min_samples(), 2048);
    }

    #[test]
    fn test_scales_keep_their_stft() {
        let device = Default::default();
        let disc: EncodecDiscriminator<TB> = tiny().init(&device);
        assert_eq!(disc.scales[0].stft.n_fft, 64);
        assert_eq!(disc.scales[1].stft.hop_length, 8);
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let disc: EncodecDiscriminator<TB> = tiny().init(&device);
        let x = Tensor::<TB, 3>::zeros([3, 2, 256], &device);
        assert_eq!(disc.scales.len(), 2);

        let (logits, fmap) = disc.scales[0].forward(x);
        assert_eq!(fmap.len(), 5);
        // 33 bins halved three times: 33 → 17 → 9 → 5; 256 / 16 + 1 frames
        assert_eq!(logits.dims(), [3, 1, 17, 5]);
    }

    #[test]
    fn test_loss_terms() {
        let device = Default::default();
        let disc: EncodecDiscriminator<TB> = tiny().init(&device);
        let reals = Tensor::<TB, 3>::random([2, 2, 256], Distribution::Normal(0.0, 0.3), &device);

        let same = disc.loss(reals.clone(), reals.clone());
        assert!(scalar(same.feature_matching).abs() < 1e-6);
        assert_eq!(same.logits_real.len(), 2);
        assert_eq!(same.logits_fake[0].dims(), same.logits_real[0].dims());

        let fakes = Tensor::<TB, 3>::random([2, 2, 256], Distribution::Normal(0.0, 0.3), &device);
        let out = disc.loss(reals, fakes);
        assert!(scalar(out.dis) >= 0.0);
        assert!(scalar(out.feature_matching) > 0.0);
        assert!(scalar(out.adv).is_finite());
    }
}
