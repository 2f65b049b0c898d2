use tracing::{debug, info};

use crate::device::{ChannelId, Direction, DmaDevice};
use crate::transfer::TransferDescriptor;
use crate::Error;
use crate::Result;

/// Fill in the transmit and receive channels of `descriptor`.
///
/// Fails when the device reports no transmit channel (checked first) or no
/// receive channel. Unset channels default to the lowest-numbered one the
/// device reports. Channels chosen by the caller are kept as they are; with
/// `strict` they must also appear in the reported sets.
pub fn resolve_channels<D>(
    device: &D,
    descriptor: &mut TransferDescriptor,
    strict: bool,
) -> Result<(ChannelId, ChannelId)>
where
    D: DmaDevice + ?Sized,
{
    let tx_channels = device.tx_channels();
    let tx_default = tx_channels.first().ok_or(Error::NoTransmitChannels)?;
    let rx_channels = device.rx_channels();
    let rx_default = rx_channels.first().ok_or(Error::NoReceiveChannels)?;
    debug!("device reports tx {} rx {}", tx_channels, rx_channels);

    if strict {
        for (channel, set, direction) in [
            (descriptor.tx_channel, &tx_channels, Direction::Transmit),
            (descriptor.rx_channel, &rx_channels, Direction::Receive),
        ] {
            if let Some(channel) = channel.filter(|c| !set.contains(*c)) {
                return Err(Error::UnknownChannel { channel, direction });
            }
        }
    }

    let tx = *descriptor.tx_channel.get_or_insert(tx_default);
    let rx = *descriptor.rx_channel.get_or_insert(rx_default);
    info!("using tx channel {} and rx channel {}", tx, rx);
    Ok((tx, rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ChannelSet;
    use crate::LoopbackDevice;

    fn device(tx: &[u32], rx: &[u32]) -> LoopbackDevice {
        LoopbackDevice::new(
            tx.iter().copied().collect::<ChannelSet>(),
            rx.iter().copied().collect::<ChannelSet>(),
        )
    }

    #[test]
    fn lowest_numbered_by_default() {
        let dev = device(&[3, 2], &[4, 1]);
        let mut d = TransferDescriptor::default();
        assert_eq!(
            resolve_channels(&dev, &mut d, false).unwrap(),
            (ChannelId(2), ChannelId(1))
        );
        assert_eq!(d.tx_channel, Some(ChannelId(2)));
        assert_eq!(d.rx_channel, Some(ChannelId(1)));
    }

    #[test]
    fn overrides_are_kept_unchecked() {
        let dev = device(&[2, 3], &[1, 4]);
        let mut d = TransferDescriptor {
            tx_channel: Some(ChannelId(9)),
            rx_channel: Some(ChannelId(4)),
            ..TransferDescriptor::default()
        };
        assert_eq!(
            resolve_channels(&dev, &mut d, false).unwrap(),
            (ChannelId(9), ChannelId(4))
        );
    }

    #[test]
    fn strict_rejects_unknown_override() {
        let dev = device(&[2, 3], &[1, 4]);
        let mut d = TransferDescriptor {
            tx_channel: Some(ChannelId(3)),
            rx_channel: Some(ChannelId(7)),
            ..TransferDescriptor::default()
        };
        assert!(matches!(
            resolve_channels(&dev, &mut d, true),
            Err(Error::UnknownChannel {
                channel: ChannelId(7),
                direction: Direction::Receive
            })
        ));
    }

    #[test]
    fn empty_transmit_set_fails_first() {
        for rx in [&[][..], &[1][..]] {
            let dev = device(&[], rx);
            let mut d = TransferDescriptor::default();
            let err = resolve_channels(&dev, &mut d, false).unwrap_err();
            assert!(matches!(err, Error::NoTransmitChannels));
            assert!(err.is_channel_discovery());
            assert_eq!(d, TransferDescriptor::default());
        }
    }

    #[test]
    fn empty_receive_set_fails() {
        let dev = device(&[0], &[]);
        let mut d = TransferDescriptor::default();
        assert!(matches!(
            resolve_channels(&dev, &mut d, false),
            Err(Error::NoReceiveChannels)
        ));
    }
}
