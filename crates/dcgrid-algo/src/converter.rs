//! Converter power model used to carry a subnetwork's demand upstream.

use dcgrid_core::{Converter, ConverterFlow, Kilowatts};

/// Operating point of a converter for one requested power.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConverterTransfer {
    /// Power drawn on the downstream side (positive when the downstream subnetwork consumes)
    pub requested: Kilowatts,
    /// Power seen by the upstream subnetwork, losses and standby included
    pub upstream: Kilowatts,
    pub loss: Kilowatts,
    pub loading_percent: f64,
}

impl ConverterTransfer {
    /// Push `requested` through the efficiency curve of `converter`.
    ///
    /// Power flowing into the downstream side costs `P / η` upstream; power
    /// flowing back delivers `P · η`. The efficiency is interpolated at `|P|`.
    pub fn through(converter: &Converter, requested: Kilowatts, include_standby: bool) -> Self {
        let efficiency = converter.efficiency.efficiency_at(requested);
        let mut upstream = if requested.value() < 0.0 {
            requested * efficiency
        } else {
            requested / efficiency
        };
        if include_standby {
            upstream = upstream + converter.standby_loss;
        }
        let loading_percent = if converter.nominal_power.value().abs() < 1e-12 {
            0.0
        } else {
            requested.abs() / converter.nominal_power * 100.0
        };
        Self {
            requested,
            upstream,
            loss: (requested - upstream).abs(),
            loading_percent,
        }
    }

    pub fn flow(&self) -> ConverterFlow {
        ConverterFlow {
            power: self.upstream,
            requested: self.requested,
            loading_percent: self.loading_percent,
            loss: self.loss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcgrid_core::{
        BusId, ConverterId, ConverterKind, CurveSource, EfficiencyCurve,
    };

    fn converter() -> Converter {
        Converter::new(
            ConverterId::new(0),
            "PDU 1",
            BusId::new(0),
            BusId::new(1),
            ConverterKind::Pdu,
            Kilowatts(10.0),
        )
        .with_efficiency(
            EfficiencyCurve::from_points(vec![(0.0, 0.8), (10.0, 0.9)]),
            CurveSource::Catalogue,
        )
    }

    #[test]
    fn test_consuming_downstream_costs_more_upstream() {
        let mut conv = converter();
        conv.standby_loss = Kilowatts(0.05);
        let transfer = ConverterTransfer::through(&conv, Kilowatts(5.0), true);
        // η(5 kW) = 0.85
        let expected = 5.0 / 0.85 + 0.05;
        assert!((transfer.upstream.value() - expected).abs() < 1e-12);
        assert!((transfer.loss.value() - (expected - 5.0)).abs() < 1e-12);
        assert!((transfer.loading_percent - 50.0).abs() < 1e-12);

        let without = ConverterTransfer::through(&conv, Kilowatts(5.0), false);
        assert!((without.upstream.value() - 5.0 / 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_exporting_downstream_delivers_less_upstream() {
        let transfer = ConverterTransfer::through(&converter(), Kilowatts(-10.0), false);
        assert!((transfer.upstream.value() + 9.0).abs() < 1e-12);
        assert!((transfer.loss.value() - 1.0).abs() < 1e-12);
        assert!((transfer.loading_percent - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_flow_record() {
        let flow = ConverterTransfer::through(&converter(), Kilowatts(10.0), false).flow();
        assert_eq!(flow.requested, Kilowatts(10.0));
        assert!((flow.power.value() - 10.0 / 0.9).abs() < 1e-12);
    }
}
