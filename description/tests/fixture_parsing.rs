//! Parsing of complete description documents as devices publish them.

use upnp_description::{DescriptionError, DeviceDescription, Direction, ServiceDescription};

/// An Internet Gateway Device: the root device carries one service and the
/// WAN connection services live two levels down in embedded devices.
const GATEWAY_DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <friendlyName>Home Router</friendlyName>
    <manufacturer>Example Networks</manufacturer>
    <modelName>GW-1</modelName>
    <UDN>uuid:gateway-1</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:Layer3Forwarding:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:L3Forwarding1</serviceId>
        <controlURL>/ctl/L3F</controlURL>
        <eventSubURL>/evt/L3F</eventSubURL>
        <SCPDURL>/L3F.xml</SCPDURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:WANCommonInterfaceConfig:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:WANCommonIFC1</serviceId>
            <controlURL>/ctl/CmnIfCfg</controlURL>
            <eventSubURL>/evt/CmnIfCfg</eventSubURL>
            <SCPDURL>/WANCfg.xml</SCPDURL>
          </service>
        </serviceList>
        <deviceList>
          <device>
            <deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
            <serviceList>
              <service>
                <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
                <serviceId>urn:upnp-org:serviceId:WANIPConn1</serviceId>
                <controlURL>/ctl/IPConn</controlURL>
                <eventSubURL>/evt/IPConn</eventSubURL>
                <SCPDURL>/WANIPCn.xml</SCPDURL>
              </service>
            </serviceList>
          </device>
        </deviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

const RENDERER_DESCRIPTION: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<root xmlns="urn:schemas-upnp-org:device-1-0" xmlns:dlna="urn:schemas-dlna-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Kitchen Speaker</friendlyName>
    <manufacturer>Acme</manufacturer>
    <modelName>Speaker</modelName>
    <UDN>uuid:speaker-1</UDN>
    <dlna:X_DLNADOC>DMR-1.50</dlna:X_DLNADOC>
    <iconList>
      <icon><mimetype>image/png</mimetype><width>48</width><height>48</height><depth>24</depth><url>/icon.png</url></icon>
    </iconList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <controlURL>/AVTransport/control</controlURL>
        <eventSubURL>/AVTransport/event</eventSubURL>
        <SCPDURL>/AVTransport/scpd.xml</SCPDURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <controlURL>RenderingControl/control</controlURL>
        <eventSubURL>RenderingControl/event</eventSubURL>
        <SCPDURL>RenderingControl/scpd.xml</SCPDURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ConnectionManager</serviceId>
        <controlURL>/ConnectionManager/control</controlURL>
        <eventSubURL>/ConnectionManager/event</eventSubURL>
        <SCPDURL>/ConnectionManager/scpd.xml</SCPDURL>
      </service>
    </serviceList>
  </device>
</root>"#;

const AV_TRANSPORT_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <actionList>
    <action>
      <name>SetAVTransportURI</name>
      <argumentList>
        <argument><name>InstanceID</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_InstanceID</relatedStateVariable></argument>
        <argument><name>CurrentURI</name><direction>in</direction><relatedStateVariable>AVTransportURI</relatedStateVariable></argument>
        <argument><name>CurrentURIMetaData</name><direction>in</direction><relatedStateVariable>AVTransportURIMetaData</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>GetTransportInfo</name>
      <argumentList>
        <argument><name>InstanceID</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_InstanceID</relatedStateVariable></argument>
        <argument><name>CurrentTransportState</name><direction>out</direction><relatedStateVariable>TransportState</relatedStateVariable></argument>
        <argument><name>CurrentTransportStatus</name><direction>out</direction><relatedStateVariable>TransportStatus</relatedStateVariable></argument>
        <argument><name>CurrentSpeed</name><direction>out</direction><relatedStateVariable>TransportPlaySpeed</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>Play</name>
      <argumentList>
        <argument><name>InstanceID</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_InstanceID</relatedStateVariable></argument>
        <argument><name>Speed</name><direction>in</direction><relatedStateVariable>TransportPlaySpeed</relatedStateVariable></argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="yes"><name>LastChange</name><dataType>string</dataType></stateVariable>
    <stateVariable sendEvents="no"><name>TransportState</name><dataType>string</dataType>
      <allowedValueList><allowedValue>STOPPED</allowedValue><allowedValue>PLAYING</allowedValue></allowedValueList>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

#[test]
fn test_embedded_device_services_are_flattened_in_document_order() {
    let description = DeviceDescription::from_xml(GATEWAY_DESCRIPTION).unwrap();

    let types: Vec<&str> = description
        .services
        .iter()
        .map(|service| service.service_type.as_str())
        .collect();
    assert_eq!(
        types,
        vec![
            "urn:schemas-upnp-org:service:Layer3Forwarding:1",
            "urn:schemas-upnp-org:service:WANCommonInterfaceConfig:1",
            "urn:schemas-upnp-org:service:WANIPConnection:1",
        ]
    );

    let wan_ip = description
        .service("urn:schemas-upnp-org:service:WANIPConnection:1")
        .unwrap();
    assert_eq!(wan_ip.control_path, "/ctl/IPConn");
    assert_eq!(wan_ip.event_path, "/evt/IPConn");
    assert_eq!(description.friendly_name.as_deref(), Some("Home Router"));
}

#[test]
fn test_renderer_with_vendor_extensions() {
    let description = DeviceDescription::from_xml(RENDERER_DESCRIPTION).unwrap();

    assert_eq!(description.services.len(), 3);
    let rendering = description
        .service("urn:schemas-upnp-org:service:RenderingControl:1")
        .unwrap();
    assert_eq!(rendering.control_path, "RenderingControl/control");
}

#[test]
fn test_service_missing_event_url_is_rejected() {
    let xml = RENDERER_DESCRIPTION.replace("<eventSubURL>/ConnectionManager/event</eventSubURL>", "");

    match DeviceDescription::from_xml(&xml).unwrap_err() {
        DescriptionError::Malformed(msg) => {
            assert!(msg.contains("eventSubURL"));
            assert!(msg.contains("ConnectionManager"));
        }
        other => panic!("Expected Malformed, got {other:?}"),
    }
}

#[test]
fn test_av_transport_scpd_keeps_declared_order() {
    let description = ServiceDescription::from_xml(AV_TRANSPORT_SCPD).unwrap();

    assert_eq!(description.actions.len(), 3);

    let set_uri = description.action("SetAVTransportURI").unwrap();
    let inputs: Vec<&str> = set_uri.in_arguments().map(|a| a.name.as_str()).collect();
    assert_eq!(inputs, vec!["InstanceID", "CurrentURI", "CurrentURIMetaData"]);

    let info = description.action("GetTransportInfo").unwrap();
    let outputs: Vec<&str> = info.out_arguments().map(|a| a.name.as_str()).collect();
    assert_eq!(
        outputs,
        vec!["CurrentTransportState", "CurrentTransportStatus", "CurrentSpeed"]
    );
    assert_eq!(info.arguments[0].direction, Direction::In);
}

#[test]
fn test_state_table_with_allowed_values() {
    let description = ServiceDescription::from_xml(AV_TRANSPORT_SCPD).unwrap();

    assert_eq!(description.state_variables.len(), 2);
    assert_eq!(description.evented_variables().count(), 1);
}
